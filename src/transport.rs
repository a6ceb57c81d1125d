//! Master-link transport (C4): the I²C-slave framing state machine around
//! the protocol engine. The SERCOM register programming itself is
//! HAL-abstracted (§1); this owns the address-match buffering, default
//! response preload, and rx-timeout bookkeeping described in §4.2.

use crate::protocol::{MAX_PAYLOAD_LEN, REQUEST_HEADER_LEN};

pub const RX_SCRATCH_LEN: usize = REQUEST_HEADER_LEN + MAX_PAYLOAD_LEN;

/// The "busy/empty" frame served on every address-match until the protocol
/// engine has produced a real response (§4.2 "Pre-loaded default
/// response"). `status = Busy`, zero-length payload, correctly CRC'd.
pub fn default_response() -> [u8; crate::protocol::RESPONSE_HEADER_LEN] {
    let mut buf = [0u8; crate::protocol::RESPONSE_HEADER_LEN];
    crate::protocol::write_response(&mut buf, crate::protocol::Status::Busy, &[]);
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
enum RxState {
    Idle,
    Buffering,
}

/// Drives the I²C-slave byte stream into a complete request frame. The ISR
/// feeds bytes in as they arrive; `main.rs`'s scheduler loop drains a
/// completed frame into the protocol engine once `take_frame` returns
/// `Some`.
pub struct MasterLinkRx {
    state: RxState,
    scratch: [u8; RX_SCRATCH_LEN],
    len: usize,
    ticks_since_last_byte: u32,
}

impl Default for MasterLinkRx {
    fn default() -> Self {
        Self {
            state: RxState::Idle,
            scratch: [0u8; RX_SCRATCH_LEN],
            len: 0,
            ticks_since_last_byte: 0,
        }
    }
}

impl MasterLinkRx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the I²C-slave ISR on address-match with direction =
    /// MCU-receive.
    pub fn on_address_match_rx(&mut self) {
        self.state = RxState::Buffering;
        self.len = 0;
        self.ticks_since_last_byte = 0;
    }

    /// Called from the ISR for each received data byte. Silently drops
    /// bytes past the scratch capacity; the protocol engine rejects the
    /// resulting frame as `TooShort`/malformed via its own length check.
    pub fn on_byte(&mut self, byte: u8) {
        if self.state == RxState::Buffering && self.len < self.scratch.len() {
            self.scratch[self.len] = byte;
            self.len += 1;
            self.ticks_since_last_byte = 0;
        }
    }

    /// Called from the ISR on stop condition. Returns the completed frame's
    /// length if one was in progress.
    pub fn on_stop(&mut self) -> Option<usize> {
        if self.state == RxState::Buffering {
            self.state = RxState::Idle;
            Some(self.len)
        } else {
            None
        }
    }

    pub fn frame(&self) -> &[u8] {
        &self.scratch[..self.len]
    }

    /// Called once per 1 ms tick; returns `true` once `rx_timeout_ms` has
    /// elapsed since the last byte while a frame is in progress, or since
    /// the last completed frame while idle.
    pub fn tick(&mut self, rx_timeout_ms: u32) -> bool {
        self.ticks_since_last_byte = self.ticks_since_last_byte.wrapping_add(1);
        self.ticks_since_last_byte >= rx_timeout_ms
    }

    pub fn reset_timeout(&mut self) {
        self.ticks_since_last_byte = 0;
    }
}

/// Holds the response the protocol engine produced, ready to be streamed
/// out on the next MCU-transmit address-match (§4.2 "snapshot
/// next_tx_buffer -> active_tx_buffer").
pub struct MasterLinkTx {
    next: [u8; crate::protocol::RESPONSE_HEADER_LEN + MAX_PAYLOAD_LEN],
    next_len: usize,
    active: [u8; crate::protocol::RESPONSE_HEADER_LEN + MAX_PAYLOAD_LEN],
    active_len: usize,
    cursor: usize,
}

impl Default for MasterLinkTx {
    fn default() -> Self {
        let default = default_response();
        let mut next = [0u8; crate::protocol::RESPONSE_HEADER_LEN + MAX_PAYLOAD_LEN];
        next[..default.len()].copy_from_slice(&default);
        Self {
            next,
            next_len: default.len(),
            active: [0u8; crate::protocol::RESPONSE_HEADER_LEN + MAX_PAYLOAD_LEN],
            active_len: 0,
            cursor: 0,
        }
    }
}

impl MasterLinkTx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the scheduler loop once the protocol engine has produced a
    /// real response, replacing whatever's queued for the next read.
    pub fn set_next_response(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.next.len());
        self.next[..n].copy_from_slice(&bytes[..n]);
        self.next_len = n;
    }

    /// Called from the ISR on address-match with direction = MCU-transmit.
    pub fn on_address_match_tx(&mut self) {
        self.active[..self.next_len].copy_from_slice(&self.next[..self.next_len]);
        self.active_len = self.next_len;
        self.cursor = 0;
    }

    /// Called from the ISR on each data-ready; returns the next byte to
    /// shift out, or a filler `0x00` once the frame is exhausted (the host
    /// controls read length).
    pub fn next_byte(&mut self) -> u8 {
        if self.cursor < self.active_len {
            let b = self.active[self.cursor];
            self.cursor += 1;
            b
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_buffers_bytes_until_stop() {
        let mut rx = MasterLinkRx::new();
        rx.on_address_match_rx();
        for b in [1u8, 2, 3] {
            rx.on_byte(b);
        }
        assert_eq!(rx.on_stop(), Some(3));
        assert_eq!(rx.frame(), &[1, 2, 3]);
    }

    #[test]
    fn rx_timeout_fires_after_configured_ticks() {
        let mut rx = MasterLinkRx::new();
        for _ in 0..99 {
            assert!(!rx.tick(100));
        }
        assert!(rx.tick(100));
    }

    #[test]
    fn rx_timeout_resets_on_byte_activity() {
        let mut rx = MasterLinkRx::new();
        rx.on_address_match_rx();
        for _ in 0..50 {
            rx.tick(100);
        }
        rx.on_byte(0xAB);
        for _ in 0..99 {
            assert!(!rx.tick(100));
        }
    }

    #[test]
    fn tx_serves_default_response_before_anything_is_queued() {
        let mut tx = MasterLinkTx::new();
        tx.on_address_match_tx();
        assert_eq!(tx.next_byte(), crate::protocol::Status::Busy as u8);
    }

    #[test]
    fn tx_switches_to_queued_response_on_next_address_match() {
        let mut tx = MasterLinkTx::new();
        tx.set_next_response(&[9, 8, 7]);
        tx.on_address_match_tx();
        assert_eq!(tx.next_byte(), 9);
        assert_eq!(tx.next_byte(), 8);
        assert_eq!(tx.next_byte(), 7);
        assert_eq!(tx.next_byte(), 0);
    }
}
