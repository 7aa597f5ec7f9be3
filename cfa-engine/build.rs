//! Stamps the engine binary with where and when it was built
//!
//! Emits `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE` for the startup
//! banner in `main.rs`.

use std::env;
use std::process::Command;

use chrono::{DateTime, SecondsFormat, Utc};

const UNKNOWN: &str = "unknown";

/// Run git in the crate directory, returning trimmed stdout on success
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Short commit id, suffixed `-dirty` when the work tree has local edits
fn revision() -> String {
    git(&["describe", "--always", "--dirty", "--abbrev=8", "--exclude=*"])
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// UTC build time; `SOURCE_DATE_EPOCH` pins it for reproducible builds
fn build_time() -> String {
    let pinned = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|secs| secs.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    pinned
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn main() {
    let profile = env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_string());

    println!("cargo:rustc-env=GIT_HASH={}", revision());
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_time());
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);
}
