#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn cli() -> Command {
        let mut cmd = Command::cargo_bin("desktop_ci_actions").unwrap();
        for var in [
            "INPUT_APPLE_CODESIGN_IDENTITY",
            "INPUT_APPLE_NOTARIZATION_USER_NAME",
            "INPUT_APPLE_NOTARIZATION_TEAM_ID",
            "INPUT_APPLE_NOTARIZATION_PASSWORD",
            "GITHUB_ENV",
            "GITHUB_OUTPUT",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn test_help_lists_actions() {
        cli()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("configure"))
            .stdout(predicate::str::contains("package"))
            .stdout(predicate::str::contains("cache-key"))
            .stdout(predicate::str::contains("notarize"));
    }

    #[test]
    fn test_merge_without_inputs_is_a_usage_error() {
        cli().args(["merge", "universal/Audio.app"]).assert().failure();
    }

    #[test]
    fn test_notarize_without_credentials_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        cli()
            .current_dir(dir.path())
            .env("GITHUB_WORKSPACE", dir.path())
            .args(["notarize", "audio.dmg"])
            .assert()
            .success()
            .stderr(predicate::str::contains("kipping"));
    }

    #[test]
    fn test_cache_key_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        cli()
            .current_dir(dir.path())
            .env("GITHUB_WORKSPACE", dir.path())
            .arg("cache-key")
            .assert()
            .code(1)
            .stderr(predicate::str::contains("dependency manifest"));
    }
}
