// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `source.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        collect_files, resolve_config_dir, validate_ref, GitSourceFetcher, SourceFetcher,
        SourceRef,
    };
    use crate::errors::SourceError;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_config_dir_root() {
        let base = Path::new("/tmp/checkout-that-does-not-exist");

        assert_eq!(resolve_config_dir(base, "/").unwrap(), base.to_path_buf());
        assert_eq!(resolve_config_dir(base, "").unwrap(), base.to_path_buf());
        assert_eq!(resolve_config_dir(base, "/prod/app").unwrap(), base.join("prod/app"));
        assert_eq!(resolve_config_dir(base, "prod").unwrap(), base.join("prod"));
    }

    #[test]
    fn test_resolve_config_dir_rejects_parent_segments() {
        // Arrange
        let workdir = TempDir::new().unwrap();
        let checkout = workdir.path().join("repo");
        fs::create_dir_all(&checkout).unwrap();
        fs::create_dir_all(workdir.path().join("operator-secrets")).unwrap();
        fs::write(workdir.path().join("operator-secrets/token"), "sa-token").unwrap();

        // Act / Assert
        for path in ["/../operator-secrets", "config/../../operator-secrets", ".."] {
            let result = resolve_config_dir(&checkout, path);
            assert!(
                matches!(result, Err(SourceError::PathEscape(_))),
                "{path} should be rejected, got {result:?}"
            );
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_config_dir_rejects_symlink_out_of_checkout() {
        // Arrange
        let workdir = TempDir::new().unwrap();
        let checkout = workdir.path().join("repo");
        let outside = workdir.path().join("outside");
        fs::create_dir_all(&checkout).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("token"), "sa-token").unwrap();
        std::os::unix::fs::symlink(&outside, checkout.join("config")).unwrap();

        // Act
        let result = resolve_config_dir(&checkout, "/config");

        // Assert
        assert!(matches!(result, Err(SourceError::PathEscape(_))), "got {result:?}");
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_config_dir_allows_symlink_inside_checkout() {
        let workdir = TempDir::new().unwrap();
        let checkout = workdir.path().join("repo");
        fs::create_dir_all(checkout.join("base")).unwrap();
        fs::write(checkout.join("base/app.yaml"), "a: 1").unwrap();
        std::os::unix::fs::symlink(checkout.join("base"), checkout.join("current")).unwrap();

        let root = resolve_config_dir(&checkout, "current").unwrap();

        let files = collect_files(&root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "app.yaml");
    }

    #[test]
    fn test_validate_ref_rejects_option_like_refs() {
        assert!(validate_ref("main").is_ok());
        assert!(validate_ref("").is_ok());
        assert!(validate_ref("release/v1-2").is_ok());
        assert!(matches!(
            validate_ref("--upload-pack=touch /tmp/pwned"),
            Err(SourceError::InvalidRef(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_coordinates_before_cloning() {
        let fetcher = GitSourceFetcher::new();
        let source = |git_ref: &str, path: &str| SourceRef {
            repo: "https://git.invalid/never-cloned.git".to_string(),
            git_ref: git_ref.to_string(),
            path: path.to_string(),
        };

        let bad_ref = fetcher.fetch(&source("-c", "/")).await;
        let bad_path = fetcher.fetch(&source("main", "/../..")).await;

        assert!(matches!(bad_ref, Err(SourceError::InvalidRef(_))), "got {bad_ref:?}");
        assert!(matches!(bad_path, Err(SourceError::PathEscape(_))), "got {bad_path:?}");
    }

    #[test]
    fn test_collect_files_walks_recursively() {
        // Arrange
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("app.yaml"), "key: value").unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("nested/db.properties"), "url=jdbc").unwrap();
        fs::write(dir.path().join("nested/deeper/log.conf"), "level=info").unwrap();

        // Act
        let files = collect_files(dir.path()).unwrap();

        // Assert
        let mut names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["app.yaml", "db.properties", "log.conf"]);
        let app = files.iter().find(|f| f.file_name == "app.yaml").unwrap();
        assert_eq!(app.content, "key: value");
    }

    #[test]
    fn test_collect_files_skips_git_and_binary() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("logo.bin"), [0xff_u8, 0xfe, 0x00, 0x81]).unwrap();
        fs::write(dir.path().join("settings.json"), "{}").unwrap();

        let files = collect_files(dir.path()).unwrap();

        assert_eq!(files.len(), 1, "Only the UTF-8 file outside .git should be read");
        assert_eq!(files[0].file_name, "settings.json");
    }

    #[test]
    fn test_collect_files_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();

        let files = collect_files(&dir.path().join("does-not-exist")).unwrap();

        assert!(files.is_empty());
    }
}
