#[cfg(test)]
pub mod tests {
    use std::process::Command;

    #[test]
    fn test_basic_output() {
        let features = ["", "global-allocator"];

        for feature in features {
            let output = Command::new("cargo")
                .args(["run", "--example", "basic", "--features", feature])
                .env("NO_COLOR", "1")
                .env_remove("TAGALLOC_FORMAT")
                .output()
                .expect("Failed to execute command");

            assert!(
                output.status.success(),
                "Process did not exit successfully with features '{feature}': {output:?}",
            );

            let expected = [
                "Owner",
                "% Live",
                ":01000007",
                ":01000008",
                "+total:",
                "All owners drained.",
            ];

            let stdout = String::from_utf8_lossy(&output.stdout);
            for expected in expected {
                assert!(
                    stdout.contains(expected),
                    "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{stdout}",
                );
            }
        }
    }

    #[test]
    fn test_basic_json_output() {
        let output = Command::new("cargo")
            .args(["run", "--example", "basic"])
            .env("TAGALLOC_FORMAT", "json")
            .output()
            .expect("Failed to execute command");

        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json_line = stdout
            .lines()
            .find(|line| line.starts_with('{'))
            .expect("No JSON report in output");
        let report: serde_json::Value =
            serde_json::from_str(json_line).expect("Report is not valid JSON");

        assert!(report["live_bytes"].as_u64().unwrap() > 0);
        let owners: Vec<u64> = report["owners"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["owner"].as_u64().unwrap())
            .collect();
        assert!(owners.contains(&0x0100_0007), "{stdout}");
        assert!(owners.contains(&0x0100_0008), "{stdout}");
    }

    #[test]
    fn test_out_of_memory_aborts() {
        let cases = [
            ("allocate", 2 * 1024 * 1024),
            ("size-overflow", usize::MAX - 2),
            ("zeroed", 4 * 1024 * 1024),
            ("zeroed-overflow", usize::MAX),
            ("reallocate", 2 * 1024 * 1024),
        ];

        for (mode, size) in cases {
            let output = Command::new("cargo")
                .args(["run", "--example", "oom_abort", "--", mode])
                .output()
                .expect("Failed to execute command");

            assert!(
                !output.status.success(),
                "Mode {mode} should have aborted: {output:?}",
            );

            let stderr = String::from_utf8_lossy(&output.stderr);
            let expected = format!("[tagalloc] Out of memory trying to allocate {size} bytes");
            assert!(
                stderr.contains(&expected),
                "Missing diagnostic for {mode}.\nExpected:\n{expected}\n\nGot:\n{stderr}",
            );

            let stdout = String::from_utf8_lossy(&output.stdout);
            assert!(!stdout.contains("unreachable"), "{mode}: {stdout}");
        }
    }

    #[test]
    fn test_stress_balances() {
        let output = Command::new("cargo")
            .args([
                "run",
                "--bin",
                "tagalloc",
                "--",
                "stress",
                "--workers",
                "4",
                "--owners",
                "16",
                "--allocations",
                "500",
                "--seed",
                "7",
                "--limit",
                "5",
            ])
            .env("NO_COLOR", "1")
            .env_remove("TAGALLOC_FORMAT")
            .output()
            .expect("Failed to execute command");

        assert!(
            output.status.success(),
            "Process did not exit successfully: {output:?}",
        );

        let stdout = String::from_utf8_lossy(&output.stdout);
        for expected in ["(seed 7)", "(5/16 owners shown)", "retained buffers"] {
            assert!(
                stdout.contains(expected),
                "Output did not match expected.\nExpected:\n{expected}\n\nGot:\n{stdout}",
            );
        }
    }

    #[test]
    fn test_tunable_rejects_startup_only_write() {
        let output = Command::new("cargo")
            .args([
                "run",
                "--bin",
                "tagalloc",
                "--",
                "tunable",
                "reserve_os_memory",
                "--set",
                "1024",
            ])
            .output()
            .expect("Failed to execute command");

        assert!(!output.status.success(), "{output:?}");
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("reserve_os_memory"), "{stderr}");
    }
}
