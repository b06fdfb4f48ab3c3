//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cell::RefCell;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

thread_local!(
    // Scratch buffer shared by the packet and LSA encoders. Users must clear
    // it before use and must not hold the borrow across encoder calls.
    pub static TLS_BUF: RefCell<BytesMut> =
        RefCell::new(BytesMut::with_capacity(4096))
);

// Big-endian readers for the field types found in OSPF packets.
//
// Like the `Buf` getters, these panic when not enough data is left, so
// callers check the remaining length first.
pub trait BytesExt {
    // Reads a 24-bit metric.
    fn get_u24(&mut self) -> u32;

    fn get_ipv4(&mut self) -> Ipv4Addr;

    // Reads an address field where 0.0.0.0 means "none" (e.g. the DR and BDR
    // fields of Hello packets).
    fn get_opt_ipv4(&mut self) -> Option<Ipv4Addr>;
}

// Big-endian writers matching `BytesExt`.
pub trait BytesMutExt {
    // Writes the low 24 bits of `n`.
    fn put_u24(&mut self, n: u32);

    fn put_ipv4(&mut self, addr: &Ipv4Addr);

    fn put_opt_ipv4(&mut self, addr: &Option<Ipv4Addr>);
}

// ===== impl Bytes =====

impl BytesExt for Bytes {
    fn get_u24(&mut self) -> u32 {
        let high = self.get_u8() as u32;
        let low = self.get_u16() as u32;
        (high << 16) | low
    }

    fn get_ipv4(&mut self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.get_u32())
    }

    fn get_opt_ipv4(&mut self) -> Option<Ipv4Addr> {
        Some(self.get_ipv4()).filter(|addr| !addr.is_unspecified())
    }
}

// ===== impl BytesMut =====

impl BytesMutExt for BytesMut {
    fn put_u24(&mut self, n: u32) {
        self.put_u8((n >> 16) as u8);
        self.put_u16(n as u16);
    }

    fn put_ipv4(&mut self, addr: &Ipv4Addr) {
        self.put_u32(addr.to_bits());
    }

    fn put_opt_ipv4(&mut self, addr: &Option<Ipv4Addr>) {
        self.put_ipv4(&addr.unwrap_or(Ipv4Addr::UNSPECIFIED));
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u24_big_endian() {
        let mut buf = BytesMut::new();
        buf.put_u24(0x0a0b0c);
        buf.put_u24(0xff_ffffff);
        assert_eq!(&buf[..], &[0x0a, 0x0b, 0x0c, 0xff, 0xff, 0xff]);

        let mut bytes = buf.freeze();
        assert_eq!(bytes.get_u24(), 0x0a0b0c);
        assert_eq!(bytes.get_u24(), 0xffffff);
        assert!(bytes.is_empty());
    }

    #[test]
    fn optional_ipv4() {
        let mut buf = BytesMut::new();
        buf.put_opt_ipv4(&None);
        buf.put_opt_ipv4(&Some(Ipv4Addr::new(10, 0, 0, 1)));

        let mut bytes = buf.freeze();
        assert_eq!(bytes.get_opt_ipv4(), None);
        assert_eq!(bytes.get_opt_ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }
}
