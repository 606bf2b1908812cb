//! 证书生成后端：原生 rcgen 实现与 openssl 命令行回退。

use std::{
    net::IpAddr,
    path::Path,
    process::{Command, Stdio},
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};

/// 自签名证书参数。
pub(crate) struct CertOptions {
    /// 证书 CN（自签名证书 subject 与 issuer 相同）。
    pub(crate) common_name: String,
    /// 写入 SAN 的主机名。
    pub(crate) dns_names: Vec<String>,
    /// 写入 SAN 的 IP 地址。
    pub(crate) ip_addrs: Vec<IpAddr>,
    /// 有效期天数。
    pub(crate) validity_days: i64,
}

/// 证书生成策略接口：生成 RSA-4096 自签名证书与私钥（PEM）并写入目标路径。
pub(crate) trait CertificateBackend: Send + Sync {
    /// 后端标识，用于日志与回退判断。
    fn name(&self) -> &'static str;

    fn generate(&self, options: &CertOptions, cert_path: &Path, key_path: &Path) -> Result<()>;
}

/// openssl 命令行调用超时。
const OPENSSL_TIMEOUT: Duration = Duration::from_secs(10);
/// 子进程退出轮询间隔。
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 原生后端：rsa 生成 RSA-4096 密钥，rcgen 组装自签名证书。
#[cfg(feature = "native-cert")]
pub(crate) struct RcgenBackend;

#[cfg(feature = "native-cert")]
impl CertificateBackend for RcgenBackend {
    fn name(&self) -> &'static str {
        "rcgen"
    }

    fn generate(&self, options: &CertOptions, cert_path: &Path, key_path: &Path) -> Result<()> {
        use rcgen::{CertificateParams, DnType, KeyPair, SanType};
        use rsa::pkcs8::EncodePrivateKey;

        let mut rng = rand::thread_rng();
        let private_key =
            rsa::RsaPrivateKey::new(&mut rng, 4096).context("generate rsa-4096 key failed")?;
        let key_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .context("encode private key pem failed")?;
        let key_pair = KeyPair::from_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256)
            .context("load rsa key into rcgen failed")?;

        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, options.common_name.as_str());
        for name in &options.dns_names {
            let san = name
                .as_str()
                .try_into()
                .with_context(|| format!("invalid san dns name: {name}"))?;
            params.subject_alt_names.push(SanType::DnsName(san));
        }
        for addr in &options.ip_addrs {
            params.subject_alt_names.push(SanType::IpAddress(*addr));
        }
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(options.validity_days);

        let cert = params
            .self_signed(&key_pair)
            .context("self-sign certificate failed")?;
        std::fs::write(cert_path, cert.pem())
            .with_context(|| format!("write cert: {}", cert_path.display()))?;
        std::fs::write(key_path, key_pem.as_str())
            .with_context(|| format!("write key: {}", key_path.display()))?;
        Ok(())
    }
}

/// 回退后端：调用系统 openssl 以等价参数生成证书。
pub(crate) struct OpensslCliBackend;

impl OpensslCliBackend {
    /// 探测系统 openssl 是否可用。
    pub(crate) fn available() -> bool {
        Command::new("openssl")
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl CertificateBackend for OpensslCliBackend {
    fn name(&self) -> &'static str {
        "openssl-cli"
    }

    fn generate(&self, options: &CertOptions, cert_path: &Path, key_path: &Path) -> Result<()> {
        let mut san_entries = Vec::new();
        for name in &options.dns_names {
            san_entries.push(format!("DNS:{name}"));
        }
        for addr in &options.ip_addrs {
            san_entries.push(format!("IP:{addr}"));
        }
        let subject = format!("/CN={}", options.common_name);
        let days = options.validity_days.to_string();
        let san = format!("subjectAltName={}", san_entries.join(","));

        let mut child = Command::new("openssl")
            .args([
                "req", "-x509", "-newkey", "rsa:4096", "-sha256", "-nodes", "-days", &days,
                "-subj", &subject, "-addext", &san,
            ])
            .arg("-keyout")
            .arg(key_path)
            .arg("-out")
            .arg(cert_path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .context("spawn openssl failed")?;

        let status = wait_with_timeout(&mut child, OPENSSL_TIMEOUT)?;
        if !status.success() {
            bail!("openssl exited with non-zero status");
        }
        Ok(())
    }
}

/// 轮询等待子进程结束；超时后杀死进程并报错，避免启动流程被挂死。
fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("wait openssl failed")? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            bail!("openssl timed out after {}s", timeout.as_secs());
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// 启动期选择证书后端：优先原生实现；原生未编译时探测 openssl。
pub(crate) fn select_backend() -> Result<Box<dyn CertificateBackend>> {
    #[cfg(feature = "native-cert")]
    {
        Ok(Box::new(RcgenBackend))
    }
    #[cfg(not(feature = "native-cert"))]
    {
        if OpensslCliBackend::available() {
            return Ok(Box::new(OpensslCliBackend));
        }
        Err(anyhow::anyhow!(
            "no certificate backend available; install openssl or enable the native-cert feature"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_with_timeout_returns_fast_exit_status() {
        let mut child = Command::new("true").spawn().unwrap();
        let status = wait_with_timeout(&mut child, Duration::from_secs(5)).unwrap();
        assert!(status.success());
    }

    #[test]
    fn wait_with_timeout_kills_hanging_process() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let err = wait_with_timeout(&mut child, Duration::from_millis(300)).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn openssl_san_entries_cover_dns_and_ip() {
        let options = CertOptions {
            common_name: "yourDeck".to_string(),
            dns_names: vec!["localhost".to_string(), "*.local".to_string()],
            ip_addrs: vec!["127.0.0.1".parse().unwrap()],
            validity_days: 3650,
        };
        let mut entries = Vec::new();
        for name in &options.dns_names {
            entries.push(format!("DNS:{name}"));
        }
        for addr in &options.ip_addrs {
            entries.push(format!("IP:{addr}"));
        }
        assert_eq!(entries.join(","), "DNS:localhost,DNS:*.local,IP:127.0.0.1");
    }
}
