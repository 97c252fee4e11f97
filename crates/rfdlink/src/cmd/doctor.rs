use std::path::PathBuf;

use rfdlink_transport::{candidate_ports, inspect_port, PortInfo, PortSpec};
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let mut checks = vec![platform_check()];

    let mut ports = candidate_ports();
    match &args.port {
        Some(PortSpec::Serial(path)) if !ports.contains(path) => ports.push(path.clone()),
        Some(PortSpec::Unix(path)) => checks.push(CheckResult {
            name: "requested_port".to_string(),
            status: CheckStatus::Skip,
            detail: format!("{} is a loopback socket, not a serial device", path.display()),
        }),
        _ => {}
    }

    if ports.is_empty() {
        checks.push(CheckResult {
            name: "serial_ports".to_string(),
            status: CheckStatus::Warn,
            detail: "no USB serial devices found (is the modem plugged in?)".to_string(),
        });
    } else {
        checks.push(CheckResult {
            name: "serial_ports".to_string(),
            status: CheckStatus::Info,
            detail: ports
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        });
        checks.extend(ports.iter().map(|path| port_check(&inspect_port(path))));
    }

    checks.push(loopback_check());
    checks.push(compiled_features_check());

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let overall = if has_fail { "fail" } else { "pass" };
    let output = DoctorOutput { checks, overall };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("rfdlink doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => {
            println!("{}", output.overall);
        }
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_check() -> CheckResult {
    if cfg!(unix) {
        CheckResult {
            name: "platform".to_string(),
            status: CheckStatus::Pass,
            detail: format!("{} termios serial and unix sockets", std::env::consts::OS),
        }
    } else {
        CheckResult {
            name: "platform".to_string(),
            status: CheckStatus::Fail,
            detail: "serial backend is only implemented for unix".to_string(),
        }
    }
}

fn port_check(info: &PortInfo) -> CheckResult {
    let name = format!("port {}", info.path.display());
    let mode = info
        .mode
        .map(|mode| format!("{mode:03o}"))
        .unwrap_or_else(|| "?".to_string());

    let (status, detail) = if !info.exists {
        (CheckStatus::Fail, "device does not exist".to_string())
    } else if info.accessible {
        let how = if info.world_writable() {
            "world-writable"
        } else if info.in_group {
            "via group membership"
        } else {
            "as owner"
        };
        (CheckStatus::Pass, format!("read/write ok {how} (mode {mode})"))
    } else if info.in_group {
        (
            CheckStatus::Fail,
            format!("mode {mode} denies access even to its group"),
        )
    } else {
        let gid = info
            .gid
            .map(|gid| gid.to_string())
            .unwrap_or_else(|| "?".to_string());
        (
            CheckStatus::Fail,
            format!(
                "permission denied (mode {mode}, gid {gid}); add yourself to the dialout group and log in again"
            ),
        )
    };

    CheckResult {
        name,
        status,
        detail,
    }
}

fn loopback_check() -> CheckResult {
    let dir = std::env::temp_dir().join(format!("rfdlink-doctor-{}", std::process::id()));
    let _ = std::fs::create_dir_all(&dir);
    let sock: PathBuf = dir.join("doctor.sock");
    let result = rfdlink_transport::LoopbackSocket::bind(&sock);
    let status = match &result {
        Ok(_) => CheckResult {
            name: "loopback_socket".to_string(),
            status: CheckStatus::Pass,
            detail: format!("can bind test sockets under {}", dir.display()),
        },
        Err(err) => CheckResult {
            name: "loopback_socket".to_string(),
            status: CheckStatus::Warn,
            detail: format!("cannot bind test socket: {err}"),
        },
    };
    drop(result);
    let _ = std::fs::remove_dir_all(&dir);
    status
}

fn compiled_features_check() -> CheckResult {
    CheckResult {
        name: "compiled_features".to_string(),
        status: CheckStatus::Info,
        detail: format!("async={}, cli=true", cfg!(feature = "async")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(exists: bool, accessible: bool, in_group: bool, mode: u32) -> PortInfo {
        PortInfo {
            path: PathBuf::from("/dev/ttyUSB0"),
            exists,
            mode: exists.then_some(mode),
            gid: exists.then_some(20),
            accessible,
            in_group,
        }
    }

    #[test]
    fn missing_device_fails() {
        let check = port_check(&info(false, false, false, 0));
        assert_eq!(check.status, CheckStatus::Fail);
    }

    #[test]
    fn inaccessible_device_suggests_dialout() {
        let check = port_check(&info(true, false, false, 0o660));
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.detail.contains("dialout"));
        assert!(check.detail.contains("660"));
    }

    #[test]
    fn group_access_passes() {
        let check = port_check(&info(true, true, true, 0o660));
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(check.detail.contains("group"));
    }

    #[test]
    fn loopback_bind_works_in_temp_dir() {
        assert_eq!(loopback_check().status, CheckStatus::Pass);
    }
}
