//! gateway CLI 分发：`run`、`doctor`、`version`。

use anyhow::anyhow;
use serde_json::json;

use crate::{
    auth::store::{credentials_store_path, load_credential_store},
    config::GatewayConfig,
};

/// CLI 分发结果。
pub(crate) enum CliDispatch {
    /// 继续进入 gateway 主循环。
    Run,
    /// 命令已处理完成，主程序应退出。
    Exit,
}

/// 解析并执行 gateway CLI。
pub(crate) fn dispatch(args: &[String]) -> anyhow::Result<CliDispatch> {
    if args.is_empty() {
        return Ok(CliDispatch::Run);
    }

    let cmd = args[0].trim();
    if cmd.is_empty() || cmd == "run" {
        return Ok(CliDispatch::Run);
    }

    if matches!(cmd, "-h" | "--help" | "help") {
        print_root_help();
        return Ok(CliDispatch::Exit);
    }

    match cmd {
        "doctor" => {
            let format = parse_doctor_format(&args[1..])?;
            run_doctor(format)?;
            Ok(CliDispatch::Exit)
        }
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(CliDispatch::Exit)
        }
        other => Err(anyhow!(
            "unknown command: {other}; run `yd-gateway --help` for usage"
        )),
    }
}

/// `doctor` 输出格式。
enum DoctorFormat {
    Text,
    Json,
}

/// 解析 doctor 的 `--format` 参数。
fn parse_doctor_format(args: &[String]) -> anyhow::Result<DoctorFormat> {
    if args.is_empty() {
        return Ok(DoctorFormat::Text);
    }
    if args.len() == 2 && args[0] == "--format" {
        return match args[1].as_str() {
            "text" => Ok(DoctorFormat::Text),
            "json" => Ok(DoctorFormat::Json),
            other => Err(anyhow!("unsupported doctor format: {other}")),
        };
    }
    Err(anyhow!("usage: yd-gateway doctor [--format text|json]"))
}

/// 打印 doctor 信息；凭证存储不可读时以非零码退出。
fn run_doctor(format: DoctorFormat) -> anyhow::Result<()> {
    let config = GatewayConfig::from_env()?;
    let credentials_path = credentials_store_path();
    let store = load_credential_store(&credentials_path);
    let configured = store.as_ref().map(|s| s.configured()).unwrap_or(false);

    match format {
        DoctorFormat::Text => {
            println!("listen-addr: {}", config.http_addr);
            println!("tls-enabled: {}", if config.tls_enabled { "yes" } else { "no" });
            println!("cert-dir: {}", config.cert_dir.display());
            println!("allowed-origins: {}", config.allowed_origins.join(","));
            println!("credential-store: {}", credentials_path.display());
            println!("credential-configured: {}", if configured { "yes" } else { "no" });
        }
        DoctorFormat::Json => {
            let payload = json!({
                "listenAddr": config.http_addr,
                "tlsEnabled": config.tls_enabled,
                "certDir": config.cert_dir.display().to_string(),
                "allowedOrigins": config.allowed_origins,
                "credentialStore": credentials_path.display().to_string(),
                "credentialConfigured": configured,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
            );
        }
    }

    if let Err(err) = store {
        eprintln!("credential store unreadable: {err}");
        std::process::exit(1);
    }
    Ok(())
}

/// 打印 root help。
fn print_root_help() {
    println!("yd-gateway usage:");
    println!("  yd-gateway run");
    println!("  yd-gateway doctor [--format text|json]");
    println!("  yd-gateway version");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_run_args_enter_main_loop() {
        assert!(matches!(dispatch(&[]).unwrap(), CliDispatch::Run));
        assert!(matches!(
            dispatch(&["run".to_string()]).unwrap(),
            CliDispatch::Run
        ));
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(dispatch(&["frobnicate".to_string()]).is_err());
    }

    #[test]
    fn doctor_format_parsing() {
        assert!(matches!(
            parse_doctor_format(&[]).unwrap(),
            DoctorFormat::Text
        ));
        assert!(matches!(
            parse_doctor_format(&["--format".to_string(), "json".to_string()]).unwrap(),
            DoctorFormat::Json
        ));
        assert!(parse_doctor_format(&["--format".to_string(), "yaml".to_string()]).is_err());
        assert!(parse_doctor_format(&["--oops".to_string()]).is_err());
    }
}
