//! Privilege preflight for raw socket access

use pulsescan_core::{Error, Result};

/// Bit index of CAP_NET_RAW in the Linux capability sets
#[cfg(target_os = "linux")]
const CAP_NET_RAW_BIT: u32 = 13;

/// Check whether the process can open raw and packet sockets
///
/// On Linux this accepts either root or an effective CAP_NET_RAW
/// capability; root is not required in principle.
pub fn has_raw_socket_capability() -> Result<bool> {
    #[cfg(target_os = "linux")]
    {
        use nix::unistd::Uid;

        if Uid::effective().is_root() {
            tracing::debug!("running as root (UID 0)");
            return Ok(true);
        }
        linux_has_cap_net_raw()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    {
        use nix::unistd::Uid;
        Ok(Uid::effective().is_root())
    }

    #[cfg(not(unix))]
    {
        Err(Error::Privilege(
            "unsupported platform for raw socket scanning".to_string(),
        ))
    }
}

/// Fail with a privilege error when raw socket access is unavailable
pub fn check_privileges() -> Result<()> {
    if !has_raw_socket_capability()? {
        return Err(Error::Privilege(
            "raw socket access requires root or CAP_NET_RAW \
             (grant with: setcap cap_net_raw+eip <binary>)"
                .to_string(),
        ));
    }
    Ok(())
}

/// Parse CapEff from /proc/self/status and test the CAP_NET_RAW bit
#[cfg(target_os = "linux")]
fn linux_has_cap_net_raw() -> Result<bool> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    for line in status.lines() {
        if let Some(hex) = line.strip_prefix("CapEff:") {
            let caps = u64::from_str_radix(hex.trim(), 16)
                .map_err(|e| Error::Privilege(format!("cannot parse CapEff: {}", e)))?;
            return Ok(caps & (1u64 << CAP_NET_RAW_BIT) != 0);
        }
    }
    tracing::debug!("no CapEff line in /proc/self/status");
    Ok(false)
}
