//! Raw nl80211 channel control
//!
//! Sets the monitor-mode channel through an AF_NETLINK socket, no
//! subprocess fork: a switch lands in well under a millisecond against
//! ~50 ms for spawning `iw`. The hopper uses this as its primary path and
//! keeps `iw` as the fallback.
//!
//! NL80211_CMD_SET_WIPHY (2) is used rather than SET_CHANNEL (64): the
//! latter returns -EOPNOTSUPP while a capture holds the VIF.

use std::io;
use std::os::unix::io::RawFd;

use tracing::{debug, info, warn};

const NETLINK_GENERIC: i32 = 16;
const NLM_F_REQUEST: u16 = 0x0001;
const NLM_F_ACK: u16 = 0x0004;

const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE: u16 = 3;

// Generic netlink controller
const GENL_ID_CTRL: u16 = 0x10;
const CTRL_CMD_GETFAMILY: u8 = 3;
const CTRL_ATTR_FAMILY_ID: u16 = 1;
const CTRL_ATTR_FAMILY_NAME: u16 = 2;

// nl80211 constants (from /usr/include/linux/nl80211.h)
const NL80211_CMD_SET_WIPHY: u8 = 2;
const NL80211_ATTR_IFINDEX: u16 = 3;
const NL80211_ATTR_WIPHY_FREQ: u16 = 38;
const NL80211_ATTR_CHANNEL_WIDTH: u16 = 159;
const NL80211_ATTR_CENTER_FREQ1: u16 = 160;
const NL80211_CHAN_WIDTH_20_NOHT: u32 = 0;

const NLMSG_HDRLEN: usize = 16;
const GENL_HDRLEN: usize = 4;

/// Direct nl80211 channel control over a raw generic netlink socket.
pub struct Nl80211Channel {
    fd: RawFd,
    family_id: u16,
    seq: u32,
}

impl Nl80211Channel {
    /// Open the socket and resolve the nl80211 family ID.
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_NETLINK, libc::SOCK_RAW, NETLINK_GENERIC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut this = Self {
            fd,
            family_id: 0,
            seq: 0,
        };

        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        let rc = unsafe {
            libc::bind(
                this.fd,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let timeout = libc::timeval {
            tv_sec: 2,
            tv_usec: 0,
        };
        unsafe {
            libc::setsockopt(
                this.fd,
                libc::SOL_SOCKET,
                libc::SO_RCVTIMEO,
                &timeout as *const libc::timeval as *const libc::c_void,
                std::mem::size_of::<libc::timeval>() as libc::socklen_t,
            );
        }

        this.family_id = this.resolve_family("nl80211")?;
        info!("nl80211 netlink initialized (family_id={})", this.family_id);
        Ok(this)
    }

    fn next_seq(&mut self) -> u32 {
        self.seq += 1;
        self.seq
    }

    /// Resolve a generic netlink family name to its numeric ID.
    fn resolve_family(&mut self, name: &str) -> io::Result<u16> {
        let seq = self.next_seq();
        let payload = nlattr_str(CTRL_ATTR_FAMILY_NAME, name);
        let msg = nlmsg(GENL_ID_CTRL, seq, &genl_header(CTRL_CMD_GETFAMILY, 1), &payload);
        self.send(&msg)?;

        loop {
            let data = self.recv()?;
            if data.len() < NLMSG_HDRLEN {
                break;
            }
            let msg_type = u16::from_ne_bytes([data[4], data[5]]);
            match msg_type {
                NLMSG_ERROR => {
                    if data.len() < NLMSG_HDRLEN + 4 {
                        break;
                    }
                    let code = i32::from_ne_bytes([data[16], data[17], data[18], data[19]]);
                    if code == 0 {
                        continue; // ACK, not an error
                    }
                    return Err(io::Error::from_raw_os_error(-code));
                }
                NLMSG_DONE => break,
                GENL_ID_CTRL => {
                    if data.len() > NLMSG_HDRLEN + GENL_HDRLEN {
                        if let Some(id) = parse_family_id(&data[NLMSG_HDRLEN + GENL_HDRLEN..]) {
                            return Ok(id);
                        }
                    }
                    break;
                }
                _ => continue,
            }
        }

        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "failed to resolve nl80211 family ID",
        ))
    }

    /// Set the channel on an interface by center frequency. Returns true
    /// when the kernel ACKs the change.
    pub fn set_channel(&mut self, ifindex: u32, freq_mhz: u32) -> bool {
        let seq = self.next_seq();

        let mut attrs = nlattr_u32(NL80211_ATTR_IFINDEX, ifindex);
        attrs.extend_from_slice(&nlattr_u32(NL80211_ATTR_WIPHY_FREQ, freq_mhz));
        attrs.extend_from_slice(&nlattr_u32(
            NL80211_ATTR_CHANNEL_WIDTH,
            NL80211_CHAN_WIDTH_20_NOHT,
        ));
        attrs.extend_from_slice(&nlattr_u32(NL80211_ATTR_CENTER_FREQ1, freq_mhz));

        let msg = nlmsg(
            self.family_id,
            seq,
            &genl_header(NL80211_CMD_SET_WIPHY, 0),
            &attrs,
        );
        if let Err(e) = self.send(&msg) {
            warn!("nl80211 send failed: {}", e);
            return false;
        }

        match self.recv() {
            Ok(data) if data.len() >= NLMSG_HDRLEN + 4 => {
                let msg_type = u16::from_ne_bytes([data[4], data[5]]);
                if msg_type == NLMSG_ERROR {
                    let code = i32::from_ne_bytes([data[16], data[17], data[18], data[19]]);
                    if code == 0 {
                        return true; // ACK
                    }
                    debug!(
                        "nl80211 set_channel failed: ifindex={} freq={} error={}",
                        ifindex, freq_mhz, code
                    );
                    return false;
                }
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("nl80211 set_channel recv error: {}", e);
                false
            }
        }
    }

    fn send(&self, msg: &[u8]) -> io::Result<()> {
        let rc = unsafe {
            libc::send(
                self.fd,
                msg.as_ptr() as *const libc::c_void,
                msg.len(),
                0,
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn recv(&self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; 4096];
        let rc = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                0,
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            buf.truncate(rc as usize);
            Ok(buf)
        }
    }
}

impl Drop for Nl80211Channel {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Interface index from sysfs.
pub fn ifindex(interface: &str) -> Option<u32> {
    std::fs::read_to_string(format!("/sys/class/net/{}/ifindex", interface))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// genlmsghdr: cmd, version, reserved.
fn genl_header(cmd: u8, version: u8) -> [u8; GENL_HDRLEN] {
    [cmd, version, 0, 0]
}

/// nlmsghdr + genl header + payload, host byte order throughout.
fn nlmsg(msg_type: u16, seq: u32, genlhdr: &[u8], payload: &[u8]) -> Vec<u8> {
    let msg_len = (NLMSG_HDRLEN + genlhdr.len() + payload.len()) as u32;
    let mut out = Vec::with_capacity(msg_len as usize);
    out.extend_from_slice(&msg_len.to_ne_bytes());
    out.extend_from_slice(&msg_type.to_ne_bytes());
    out.extend_from_slice(&(NLM_F_REQUEST | NLM_F_ACK).to_ne_bytes());
    out.extend_from_slice(&seq.to_ne_bytes());
    out.extend_from_slice(&0u32.to_ne_bytes()); // nlmsg_pid
    out.extend_from_slice(genlhdr);
    out.extend_from_slice(payload);
    out
}

/// One netlink attribute: nla_len, nla_type, payload, 4-byte padding.
fn nlattr(attr_type: u16, data: &[u8]) -> Vec<u8> {
    let nla_len = (4 + data.len()) as u16;
    let padded = (nla_len as usize + 3) & !3;
    let mut out = Vec::with_capacity(padded);
    out.extend_from_slice(&nla_len.to_ne_bytes());
    out.extend_from_slice(&attr_type.to_ne_bytes());
    out.extend_from_slice(data);
    out.resize(padded, 0);
    out
}

fn nlattr_u32(attr_type: u16, value: u32) -> Vec<u8> {
    nlattr(attr_type, &value.to_ne_bytes())
}

fn nlattr_str(attr_type: u16, value: &str) -> Vec<u8> {
    let mut data = value.as_bytes().to_vec();
    data.push(0);
    nlattr(attr_type, &data)
}

/// Extract CTRL_ATTR_FAMILY_ID from a netlink attribute stream.
fn parse_family_id(data: &[u8]) -> Option<u16> {
    let mut offset = 0;
    while offset + 4 <= data.len() {
        let nla_len = u16::from_ne_bytes([data[offset], data[offset + 1]]) as usize;
        let nla_type = u16::from_ne_bytes([data[offset + 2], data[offset + 3]]);
        if nla_len < 4 {
            break;
        }
        if nla_type == CTRL_ATTR_FAMILY_ID {
            if offset + 6 > data.len() {
                break;
            }
            return Some(u16::from_ne_bytes([data[offset + 4], data[offset + 5]]));
        }
        offset += (nla_len + 3) & !3;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nlattr_layout_and_padding() {
        let attr = nlattr_u32(NL80211_ATTR_IFINDEX, 7);
        // 4-byte header + 4-byte payload, already aligned
        assert_eq!(attr.len(), 8);
        assert_eq!(u16::from_ne_bytes([attr[0], attr[1]]), 8);
        assert_eq!(u16::from_ne_bytes([attr[2], attr[3]]), NL80211_ATTR_IFINDEX);
        assert_eq!(u32::from_ne_bytes([attr[4], attr[5], attr[6], attr[7]]), 7);

        // "nl80211" + NUL is 8 bytes: nla_len 12, no padding needed
        let attr = nlattr_str(CTRL_ATTR_FAMILY_NAME, "nl80211");
        assert_eq!(u16::from_ne_bytes([attr[0], attr[1]]), 12);
        assert_eq!(attr.len(), 12);
        assert_eq!(&attr[4..12], b"nl80211\0");

        // Odd payload length pads to the next 4-byte boundary
        let attr = nlattr_str(CTRL_ATTR_FAMILY_NAME, "ab");
        assert_eq!(u16::from_ne_bytes([attr[0], attr[1]]), 7);
        assert_eq!(attr.len(), 8);
        assert_eq!(attr[7], 0);
    }

    #[test]
    fn test_nlmsg_header() {
        let msg = nlmsg(GENL_ID_CTRL, 3, &genl_header(CTRL_CMD_GETFAMILY, 1), &[1, 2, 3, 4]);
        assert_eq!(
            u32::from_ne_bytes([msg[0], msg[1], msg[2], msg[3]]) as usize,
            msg.len()
        );
        assert_eq!(u16::from_ne_bytes([msg[4], msg[5]]), GENL_ID_CTRL);
        assert_eq!(
            u16::from_ne_bytes([msg[6], msg[7]]),
            NLM_F_REQUEST | NLM_F_ACK
        );
        assert_eq!(u32::from_ne_bytes([msg[8], msg[9], msg[10], msg[11]]), 3);
        assert_eq!(msg[NLMSG_HDRLEN], CTRL_CMD_GETFAMILY);
        assert_eq!(msg.len(), NLMSG_HDRLEN + GENL_HDRLEN + 4);
    }

    #[test]
    fn test_parse_family_id_skips_other_attrs() {
        // A name attribute first, then the family ID
        let mut stream = nlattr_str(CTRL_ATTR_FAMILY_NAME, "nl80211");
        stream.extend_from_slice(&nlattr(CTRL_ATTR_FAMILY_ID, &28u16.to_ne_bytes()));
        assert_eq!(parse_family_id(&stream), Some(28));

        assert_eq!(parse_family_id(&[]), None);
        // Truncated attribute header
        assert_eq!(parse_family_id(&[4, 0]), None);
    }

    #[test]
    fn test_ifindex_unknown_interface() {
        assert_eq!(ifindex("definitely-not-a-nic-0"), None);
    }
}
