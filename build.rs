// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMERA_SCAN_VERSION");

    // Packagers building from a tarball set the version explicitly
    let version = std::env::var("CAMERA_SCAN_VERSION").unwrap_or_else(|_| describe_version());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version from `git describe`
///
/// - `v0.3.0` at the tag becomes `0.3.0-<hash>`
/// - `v0.3.0-4-g1a2b3c4` after the tag becomes `0.3.0-dirty-1a2b3c4`
/// - no tags or no git: the short hash, or the crate version
fn describe_version() -> String {
    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return env!("CARGO_PKG_VERSION").to_string();
    };

    let Some(described) = git(&["describe", "--tags", "--match", "v*"]) else {
        return hash;
    };
    let described = described.strip_prefix('v').unwrap_or(&described);

    match described.rsplitn(3, '-').collect::<Vec<_>>().as_slice() {
        [commit, _count, base] => {
            format!("{}-dirty-{}", base, commit.strip_prefix('g').unwrap_or(commit))
        }
        _ => format!("{}-{}", described, hash),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
