//! `kubeinteract doctor`: Diagnose configuration and environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use kubeinteract_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 kubeinteract Doctor: System Diagnostics");
    println!("==========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ℹ️  No config file at {} (using defaults and environment)", config_path.display());
    }

    match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");

            match config.require_model_endpoint() {
                Ok((api_url, model)) => {
                    println!("  ✅ Model endpoint: {api_url}");
                    println!("  ✅ Model: {model}");
                }
                Err(e) => {
                    println!("  ❌ {e}");
                    issues += 1;
                }
            }

            match config.resolved_provider() {
                "openai" if !config.has_api_key() => {
                    println!("  ⚠️  No API key configured, set MODEL_API_KEY or api_key in config.toml");
                    issues += 1;
                }
                provider => println!("  ✅ Provider: {provider}"),
            }

            if let Some(ca_cert) = &config.ca_cert {
                if ca_cert.is_file() {
                    println!("  ✅ CA certificate: {}", ca_cert.display());
                } else {
                    println!("  ❌ CA certificate not found: {}", ca_cert.display());
                    issues += 1;
                }
            }

            let files = config.kubeconfig_files();
            let (found, missing) = partition_existing(&files);
            for path in &found {
                println!("  ✅ Kubeconfig: {}", path.display());
            }
            for path in &missing {
                println!("  ⚠️  Kubeconfig not found: {}", path.display());
            }
            if found.is_empty() {
                issues += 1;
            }
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            issues += 1;
        }
    }

    match find_in_path("kubectl", std::env::var_os("PATH")) {
        Some(path) => println!("  ✅ kubectl found at {}", path.display()),
        None => {
            println!("  ❌ kubectl not found on PATH");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

/// Split kubeconfig files into those that exist and those that don't.
/// kubectl skips missing entries of a list, so only an empty first half is a problem.
fn partition_existing(files: &[PathBuf]) -> (Vec<&Path>, Vec<&Path>) {
    files.iter().map(PathBuf::as_path).partition(|p| p.is_file())
}

/// First `name` executable in the directories of `path_var`.
fn find_in_path(name: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubeconfig_list_with_one_missing_file_still_has_a_config() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("admin.conf");
        std::fs::write(&present, "apiVersion: v1\nkind: Config\n").unwrap();
        let absent = dir.path().join("gone.conf");

        let files = vec![present.clone(), absent.clone()];
        let (found, missing) = partition_existing(&files);
        assert_eq!(found, vec![present.as_path()]);
        assert_eq!(missing, vec![absent.as_path()]);
    }

    #[test]
    fn finds_executable_in_path() {
        let empty = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let kubectl = bin.path().join("kubectl");
        std::fs::write(&kubectl, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let path_var = std::env::join_paths([empty.path(), bin.path()]).unwrap();
        assert_eq!(find_in_path("kubectl", Some(path_var)), Some(kubectl));
    }

    #[test]
    fn missing_executable_or_path() {
        let empty = tempfile::tempdir().unwrap();
        let path_var = std::env::join_paths([empty.path()]).unwrap();
        assert_eq!(find_in_path("kubectl", Some(path_var)), None);
        assert_eq!(find_in_path("kubectl", None), None);
    }
}
