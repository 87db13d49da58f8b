use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let commit = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let branch = git(&["branch", "--show-current"]).unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=TOOLSTASH_GIT_COMMIT={}", commit);
    println!("cargo:rustc-env=TOOLSTASH_GIT_BRANCH={}", branch);

    // Release builds report just the tag
    if let Some(tag) = git(&["tag", "--points-at", "HEAD"]) {
        let tag = tag.lines().next().unwrap_or_default();
        println!("cargo:rustc-env=TOOLSTASH_GIT_TAG={}", tag);
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}
