use crate::types::PlatformInfo;

/// Host platform using Node's naming (`linux`/`darwin`/`win32`, `x64`/`arm64`),
/// which is how tool caches on CI runners lay out their directories.
pub fn get_system_info() -> PlatformInfo {
    let os = match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        "windows" => "win32".to_string(),
        other => other.to_string(),
    };

    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" => "ia32".to_string(),
        other => other.to_string(),
    };

    PlatformInfo { os, arch }
}
