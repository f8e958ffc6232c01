//! Local interface address enumeration

#[cfg(unix)]
pub fn local_ip_addresses() -> Vec<String> {
    use std::ffi::c_void;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::ptr;

    let mut addrs: *mut libc::ifaddrs = ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut addrs) } != 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut cursor = addrs;
    while !cursor.is_null() {
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_addr.is_null() {
            continue;
        }
        let family = unsafe { (*entry.ifa_addr).sa_family } as i32;
        let ip: IpAddr = match family {
            libc::AF_INET => {
                let sin = entry.ifa_addr as *const c_void as *const libc::sockaddr_in;
                let raw = unsafe { (*sin).sin_addr.s_addr };
                IpAddr::V4(Ipv4Addr::from(u32::from_be(raw)))
            }
            libc::AF_INET6 => {
                let sin6 = entry.ifa_addr as *const c_void as *const libc::sockaddr_in6;
                let octets = unsafe { (*sin6).sin6_addr.s6_addr };
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            _ => continue,
        };
        if ip.is_loopback() {
            continue;
        }
        out.push(ip.to_string());
    }

    unsafe { libc::freeifaddrs(addrs) };
    out
}

#[cfg(not(unix))]
pub fn local_ip_addresses() -> Vec<String> {
    Vec::new()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[test]
    fn test_addresses_parse_and_exclude_loopback() {
        for addr in local_ip_addresses() {
            let ip: IpAddr = addr.parse().expect("enumerated address must parse");
            assert!(!ip.is_loopback());
        }
    }
}
