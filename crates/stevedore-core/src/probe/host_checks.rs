//! Pure classification of host command output.
//!
//! Command execution lives in [`crate::process`]; everything here takes
//! captured text and produces a verdict, so the fragile parsing is unit
//! testable without touching the host.

use crate::probe::models::VirtualizationState;

pub(crate) const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Parses a Windows `ver` banner, e.g.
/// `Microsoft Windows [Version 10.0.19045.3930]`.
pub(crate) fn parse_windows_version(banner: &str) -> Option<(u32, u32)> {
    let start = banner.find("Version ")? + "Version ".len();
    let tail = &banner[start..];
    let digits: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    let mut parts = digits.split('.');
    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = parts.next().and_then(|p| p.parse::<u32>().ok()).unwrap_or(0);
    Some((major, minor))
}

pub(crate) fn windows_version_supported(major: u32) -> bool {
    major >= 10
}

/// Classifies `systeminfo` output. The enabled/disabled markers are the ones
/// the tool prints on English and Chinese locales; anything else is reported
/// as `Unknown` rather than silently passing or failing.
pub(crate) fn classify_virtualization(systeminfo_output: &str) -> VirtualizationState {
    const SUPPORTED_MARKERS: [&str; 3] = [
        "Virtualization Enabled In Firmware: Yes",
        "A hypervisor has been detected",
        "\u{865a}\u{62df}\u{5316}\u{5df2}\u{542f}\u{7528}", // 虚拟化已启用
    ];
    const UNSUPPORTED_MARKERS: [&str; 1] = ["Virtualization Enabled In Firmware: No"];

    if SUPPORTED_MARKERS
        .iter()
        .any(|marker| systeminfo_output.contains(marker))
    {
        return VirtualizationState::Supported;
    }

    if UNSUPPORTED_MARKERS
        .iter()
        .any(|marker| systeminfo_output.contains(marker))
    {
        return VirtualizationState::Unsupported;
    }

    VirtualizationState::Unknown
}

/// Free bytes from a PowerShell `(Get-PSDrive C).Free` query (a bare number).
pub(crate) fn parse_free_bytes_windows(output: &str) -> Option<u64> {
    output.trim().parse::<u64>().ok()
}

/// Free bytes from POSIX `df -Pk /` output (available column, KiB units).
pub(crate) fn parse_free_bytes_df(output: &str) -> Option<u64> {
    let data_line = output.lines().nth(1)?;
    let available_kib = data_line.split_whitespace().nth(3)?.parse::<u64>().ok()?;
    Some(available_kib * 1024)
}

pub(crate) fn format_gib(bytes: u64) -> String {
    format!("{:.2} GiB", bytes as f64 / BYTES_PER_GIB as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ver_banner() {
        assert_eq!(
            parse_windows_version("Microsoft Windows [Version 10.0.19045.3930]"),
            Some((10, 0))
        );
        assert_eq!(
            parse_windows_version("Microsoft Windows [Version 6.1.7601]"),
            Some((6, 1))
        );
        assert_eq!(parse_windows_version("garbage"), None);
    }

    #[test]
    fn version_gate_is_ten_or_newer() {
        assert!(windows_version_supported(10));
        assert!(windows_version_supported(11));
        assert!(!windows_version_supported(6));
    }

    #[test]
    fn virtualization_tri_state() {
        assert_eq!(
            classify_virtualization("... Virtualization Enabled In Firmware: Yes ..."),
            VirtualizationState::Supported
        );
        assert_eq!(
            classify_virtualization("Hyper-V Requirements: A hypervisor has been detected."),
            VirtualizationState::Supported
        );
        assert_eq!(
            classify_virtualization("... Virtualization Enabled In Firmware: No ..."),
            VirtualizationState::Unsupported
        );
        assert_eq!(
            classify_virtualization("localized output with no known marker"),
            VirtualizationState::Unknown
        );
    }

    #[test]
    fn parses_free_space_outputs() {
        assert_eq!(parse_free_bytes_windows(" 53687091200 \n"), Some(53687091200));
        assert_eq!(parse_free_bytes_windows("not-a-number"), None);

        let df = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                  /dev/sda1 102400000 51200000 20971520 50% /\n";
        assert_eq!(parse_free_bytes_df(df), Some(20971520 * 1024));
        assert_eq!(parse_free_bytes_df("header only\n"), None);
    }

    #[test]
    fn formats_gib_for_humans() {
        assert_eq!(format_gib(10 * BYTES_PER_GIB), "10.00 GiB");
    }
}
