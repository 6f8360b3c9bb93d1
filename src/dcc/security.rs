//! Checks applied to DCC offers before anything touches the filesystem or
//! the network.
//!
//! - **Path traversal**: peer-supplied names are reduced to a bare file name.
//! - **Private addresses**: optionally refuse senders on private, loopback or
//!   link-local addresses.
//! - **Size limit**: optionally refuse offers above a configured size.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use super::DccError;
use crate::config::DccConfig;

const MAX_NAME_LEN: usize = 255;

pub fn is_private_ip(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
}

/// Reduce a peer-supplied name to something safe to create in the download
/// directory: no path components, no control characters, no leading dots.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    // Backslash is a legal character on Unix, so split on it by hand.
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != ':')
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        return None;
    }

    let mut end = cleaned.len().min(MAX_NAME_LEN);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    Some(cleaned[..end].to_string())
}

/// Where a sanitized file name lives in the download directory.
pub fn download_path(download_dir: &Path, filename: &str) -> Result<PathBuf, DccError> {
    let name =
        sanitize_filename(filename).ok_or_else(|| DccError::UnsafeName(filename.to_string()))?;
    Ok(download_dir.join(name))
}

/// Offer limits taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub max_file_size: u64,
    pub reject_private_ips: bool,
}

impl Policy {
    pub fn from_config(config: &DccConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            reject_private_ips: config.reject_private_ips,
        }
    }

    pub fn check(&self, addr: Ipv4Addr, size: u64) -> Result<(), DccError> {
        if self.reject_private_ips && is_private_ip(&addr) {
            return Err(DccError::PrivateAddress(addr));
        }
        if self.max_file_size > 0 && size > self.max_file_size {
            return Err(DccError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("hello.txt"), Some("hello.txt".into()));
        assert_eq!(sanitize_filename("../../../etc/passwd"), Some("passwd".into()));
        assert_eq!(
            sanitize_filename("..\\..\\windows\\system32"),
            Some("system32".into())
        );
        assert_eq!(sanitize_filename(".hidden"), Some("hidden".into()));
        assert_eq!(sanitize_filename("bell\x07name"), Some("bellname".into()));
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename("normal file.pdf"), Some("normal file.pdf".into()));
    }

    #[test]
    fn long_names_are_cut_on_char_boundary() {
        let name = "é".repeat(200);
        let cleaned = sanitize_filename(&name).unwrap();
        assert!(cleaned.len() <= MAX_NAME_LEN);
        assert!(cleaned.chars().all(|c| c == 'é'));
    }

    #[test]
    fn download_path_stays_in_directory() {
        let dir = Path::new("/downloads");
        assert_eq!(
            download_path(dir, "../../x.bin").unwrap(),
            PathBuf::from("/downloads/x.bin")
        );
        assert!(matches!(download_path(dir, ".."), Err(DccError::UnsafeName(_))));
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip(&Ipv4Addr::new(127, 0, 0, 1)));
        assert!(is_private_ip(&Ipv4Addr::new(192, 168, 1, 1)));
        assert!(is_private_ip(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!is_private_ip(&Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn policy_limits() {
        let open = Policy {
            max_file_size: 0,
            reject_private_ips: false,
        };
        assert!(open.check(Ipv4Addr::LOCALHOST, u64::MAX).is_ok());

        let strict = Policy {
            max_file_size: 100,
            reject_private_ips: true,
        };
        assert!(matches!(
            strict.check(Ipv4Addr::LOCALHOST, 1),
            Err(DccError::PrivateAddress(_))
        ));
        assert!(matches!(
            strict.check(Ipv4Addr::new(8, 8, 8, 8), 101),
            Err(DccError::TooLarge { size: 101, limit: 100 })
        ));
        assert!(strict.check(Ipv4Addr::new(8, 8, 8, 8), 100).is_ok());
    }
}
