use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Variables that would leak the developer's or runner's setup into a test.
const ISOLATED_VARS: [&str; 10] = [
    "TOOLSTASH_PACKAGE",
    "TOOLSTASH_REGISTRY",
    "TOOLSTASH_REMOTE_CACHE",
    "TOOLSTASH_REMOTE_TOKEN",
    "NPM_CONFIG_REGISTRY",
    "RUNNER_TOOL_CACHE",
    "GITHUB_PATH",
    "RUST_LOG",
    "TOOLSTASH_CACHE_DIR",
    "TOOLSTASH_PACKAGER_PATH",
];

// Not every test binary uses every helper.
#[allow(dead_code)]
pub struct TestContext {
    pub _temp_dir: TempDir,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub runner_temp: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.json");
        let cache_dir = temp_dir.path().join("toolcache");
        let runner_temp = temp_dir.path().join("runner-temp");

        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_toolstash"));

        Self {
            _temp_dir: temp_dir,
            config_path,
            cache_dir,
            runner_temp,
            bin_path,
        }
    }

    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        for var in ISOLATED_VARS {
            cmd.env_remove(var);
        }
        cmd.env("TOOLSTASH_CONFIG_PATH", &self.config_path);
        cmd.env("TOOLSTASH_CACHE_DIR", &self.cache_dir);
        cmd.env("RUNNER_TEMP", &self.runner_temp);
        // Nothing in these tests may reach a real registry
        cmd.env("TOOLSTASH_REGISTRY", "http://127.0.0.1:9");
        cmd
    }

    /// Seed a complete local cache entry for `version` and return its directory.
    pub fn seed_local_cache(&self, tool: &str, version: &str) -> PathBuf {
        let version_dir = self.cache_dir.join(tool).join(version);
        let entry = version_dir.join(node_arch());
        fs::create_dir_all(entry.join("node_modules/.bin")).expect("Failed to seed cache");
        fs::write(entry.join("node_modules/.bin/expo"), "#!/bin/sh\n").expect("Failed to seed");
        fs::write(version_dir.join(format!("{}.complete", node_arch())), "{}")
            .expect("Failed to write marker");
        entry
    }

    /// Install a fake packager script into `<root>/fakebin` and return a PATH
    /// that finds it first.
    #[cfg(unix)]
    pub fn fake_packager(&self, name: &str, body: &str) -> std::ffi::OsString {
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = self.root().join("fakebin");
        fs::create_dir_all(&bin_dir).expect("Failed to create fake bin dir");
        let script = bin_dir.join(name);
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();

        let mut paths = vec![bin_dir];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        std::env::join_paths(paths).expect("Failed to build PATH")
    }
}

pub fn node_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        assert!(
            !self.status.success(),
            "Command unexpectedly succeeded\nstdout: {}",
            self.stdout
        );
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
