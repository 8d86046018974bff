//! In-process simulated radio.
//!
//! [`SimRadio`] implements every capability of [`HalModule`] against plain
//! memory: transmitted frames are recorded for inspection and received frames
//! are injected by the caller. The node binary uses it when no hardware driver
//! is configured, and tests use it to drive the stack end to end.

use std::sync::{Mutex, MutexGuard, PoisonError};

use umesh_core::{MacAddress, MediaType};

use crate::error::HalError;
use crate::traits::{
    ExtNetId, Frame, FrameInfo, FrameStats, HalModule, ReceiveCallback, SendStatus,
    SentCallback,
};

/// Default MTU for simulated radios that do not override it.
pub const SIM_DEFAULT_MTU: usize = 127;

/// A frame handed to the simulated radio for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// `None` for broadcast.
    pub dest: Option<MacAddress>,
    pub frame: Frame,
}

struct SimState {
    initialized: bool,
    enabled: bool,
    fail_enable: bool,
    awake: bool,
    channel: u8,
    txpower: i8,
    extnetid: ExtNetId,
    receiver: Option<ReceiveCallback>,
    sent: Vec<SentFrame>,
    stats: FrameStats,
}

pub struct SimRadio {
    name: String,
    media: MediaType,
    mac: MacAddress,
    ucast_mtu: Option<usize>,
    bcast_mtu: Option<usize>,
    channels: Vec<u8>,
    state: Mutex<SimState>,
}

impl SimRadio {
    pub fn new(name: impl Into<String>, media: MediaType, mac: MacAddress) -> Self {
        let channels = match media {
            MediaType::Wifi => vec![1, 6, 11],
            MediaType::Ble => vec![37, 38, 39],
            MediaType::Ieee802154 => (11..=26).collect(),
            MediaType::Default => vec![0],
        };
        let channel = channels[0];
        Self {
            name: name.into(),
            media,
            mac,
            ucast_mtu: Some(SIM_DEFAULT_MTU),
            bcast_mtu: Some(SIM_DEFAULT_MTU),
            channels,
            state: Mutex::new(SimState {
                initialized: false,
                enabled: false,
                fail_enable: false,
                awake: true,
                channel,
                txpower: 0,
                extnetid: ExtNetId::default(),
                receiver: None,
                sent: Vec::new(),
                stats: FrameStats::default(),
            }),
        }
    }

    /// Override the MTUs; `None` makes the capability unsupported.
    pub fn with_mtu(mut self, ucast: Option<usize>, bcast: Option<usize>) -> Self {
        self.ucast_mtu = ucast;
        self.bcast_mtu = bcast;
        self
    }

    /// Override the channel list. The first channel becomes current.
    pub fn with_channels(mut self, channels: Vec<u8>) -> Self {
        if let Some(&first) = channels.first() {
            self.lock().channel = first;
        }
        self.channels = channels;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `frame` to the registered receiver as if it came off the air.
    ///
    /// Returns `false` when the radio is disabled, asleep, or has no receiver.
    pub fn inject(&self, frame: Frame, info: FrameInfo) -> bool {
        let receiver = {
            let mut state = self.lock();
            if !state.enabled || !state.awake {
                return false;
            }
            state.stats.in_frames += 1;
            state.receiver.clone()
        };
        // Invoke outside the lock: the receiver may call back into the radio.
        match receiver {
            Some(received) => {
                received(frame, info);
                true
            }
            None => false,
        }
    }

    /// Drain the frames transmitted so far.
    pub fn take_sent(&self) -> Vec<SentFrame> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Make `enable` fail with a driver error until cleared.
    pub fn set_enable_failure(&self, fail: bool) {
        self.lock().fail_enable = fail;
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn is_awake(&self) -> bool {
        self.lock().awake
    }

    pub fn has_receiver(&self) -> bool {
        self.lock().receiver.is_some()
    }

    fn transmit(
        &self,
        frame: &Frame,
        dest: Option<MacAddress>,
        mtu: Option<usize>,
        sent: Option<SentCallback>,
    ) -> Result<(), HalError> {
        let mtu = mtu.ok_or(HalError::Unsupported)?;
        {
            let mut state = self.lock();
            if !state.enabled {
                return Err(HalError::NotEnabled);
            }
            if frame.len() > mtu {
                return Err(HalError::FrameTooLarge {
                    size: frame.len(),
                    mtu,
                });
            }
            state.stats.out_frames += 1;
            state.sent.push(SentFrame {
                dest,
                frame: frame.clone(),
            });
        }
        tracing::trace!(radio = %self.name, len = frame.len(), "sim: frame sent");
        if let Some(done) = sent {
            done(SendStatus::Sent);
        }
        Ok(())
    }
}

impl HalModule for SimRadio {
    fn name(&self) -> &str {
        &self.name
    }

    fn media_type(&self) -> MediaType {
        self.media
    }

    fn init(&self) -> Result<(), HalError> {
        self.lock().initialized = true;
        Ok(())
    }

    fn enable(&self) -> Result<(), HalError> {
        let mut state = self.lock();
        if state.fail_enable {
            return Err(HalError::Driver(format!("{}: enable refused", self.name)));
        }
        state.enabled = true;
        Ok(())
    }

    fn disable(&self) -> Result<(), HalError> {
        self.lock().enabled = false;
        Ok(())
    }

    fn send_ucast(
        &self,
        frame: &Frame,
        dest: &MacAddress,
        sent: Option<SentCallback>,
    ) -> Result<(), HalError> {
        self.transmit(frame, Some(*dest), self.ucast_mtu, sent)
    }

    fn send_bcast(&self, frame: &Frame, sent: Option<SentCallback>) -> Result<(), HalError> {
        self.transmit(frame, None, self.bcast_mtu, sent)
    }

    fn register_receiver(&self, received: ReceiveCallback) -> Result<(), HalError> {
        self.lock().receiver = Some(received);
        Ok(())
    }

    fn ucast_mtu(&self) -> Result<usize, HalError> {
        self.ucast_mtu.ok_or(HalError::Unsupported)
    }

    fn bcast_mtu(&self) -> Result<usize, HalError> {
        self.bcast_mtu.ok_or(HalError::Unsupported)
    }

    fn set_channel(&self, channel: u8) -> Result<(), HalError> {
        if !self.channels.contains(&channel) {
            return Err(HalError::InvalidChannel(channel));
        }
        self.lock().channel = channel;
        Ok(())
    }

    fn channel(&self) -> Result<u8, HalError> {
        Ok(self.lock().channel)
    }

    fn channel_list(&self) -> Result<Vec<u8>, HalError> {
        Ok(self.channels.clone())
    }

    fn set_txpower(&self, power: i8) -> Result<(), HalError> {
        self.lock().txpower = power;
        Ok(())
    }

    fn txpower(&self) -> Result<i8, HalError> {
        Ok(self.lock().txpower)
    }

    fn set_extnetid(&self, extnetid: &ExtNetId) -> Result<(), HalError> {
        self.lock().extnetid = extnetid.clone();
        Ok(())
    }

    fn extnetid(&self) -> Result<ExtNetId, HalError> {
        Ok(self.lock().extnetid.clone())
    }

    fn mac_address(&self) -> Result<MacAddress, HalError> {
        Ok(self.mac)
    }

    fn radio_wakeup(&self) -> Result<(), HalError> {
        self.lock().awake = true;
        Ok(())
    }

    fn radio_sleep(&self) -> Result<(), HalError> {
        self.lock().awake = false;
        Ok(())
    }

    fn stats(&self) -> Result<FrameStats, HalError> {
        Ok(self.lock().stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn radio() -> SimRadio {
        SimRadio::new("sim0", MediaType::Wifi, MacAddress::eui48([2, 0, 0, 0, 0, 9]))
    }

    fn info() -> FrameInfo {
        FrameInfo {
            peer: MacAddress::eui48([2, 0, 0, 0, 0, 1]),
            channel: 1,
            rssi: -40,
            key_index: -1,
        }
    }

    #[test]
    fn send_requires_enable() {
        let r = radio();
        let err = r.send_bcast(&Frame::new(vec![1]), None).unwrap_err();
        assert_eq!(err, HalError::NotEnabled);
        r.enable().unwrap();
        assert!(r.send_bcast(&Frame::new(vec![1]), None).is_ok());
    }

    #[test]
    fn enable_failure_is_reported() {
        let r = radio();
        r.set_enable_failure(true);
        assert!(matches!(r.enable(), Err(HalError::Driver(_))));
        assert!(!r.is_enabled());
        r.set_enable_failure(false);
        r.enable().unwrap();
        assert!(r.is_enabled());
    }

    #[test]
    fn send_enforces_mtu() {
        let r = radio().with_mtu(Some(8), Some(4));
        r.enable().unwrap();
        let err = r.send_bcast(&Frame::new(vec![0; 5]), None).unwrap_err();
        assert_eq!(err, HalError::FrameTooLarge { size: 5, mtu: 4 });
        let dest = MacAddress::eui48([2, 0, 0, 0, 0, 1]);
        assert!(r.send_ucast(&Frame::new(vec![0; 5]), &dest, None).is_ok());
        assert_eq!(r.take_sent()[0].dest, Some(dest));
    }

    #[test]
    fn unsupported_mtu_is_reported() {
        let r = radio().with_mtu(None, Some(64));
        assert_eq!(r.ucast_mtu(), Err(HalError::Unsupported));
        assert_eq!(r.bcast_mtu(), Ok(64));
    }

    #[test]
    fn sent_callback_fires() {
        let r = radio();
        r.enable().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        r.send_bcast(
            &Frame::new(vec![1]),
            Some(Box::new(move |status| {
                assert_eq!(status, SendStatus::Sent);
                h.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn inject_reaches_receiver_only_when_awake() {
        let r = radio();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        r.register_receiver(Arc::new(move |frame, _info| {
            assert_eq!(frame.data, vec![7, 7]);
            h.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        assert!(!r.inject(Frame::new(vec![7, 7]), info()));
        r.enable().unwrap();
        assert!(r.inject(Frame::new(vec![7, 7]), info()));
        r.radio_sleep().unwrap();
        assert!(!r.inject(Frame::new(vec![7, 7]), info()));
        r.radio_wakeup().unwrap();
        assert!(r.inject(Frame::new(vec![7, 7]), info()));

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(r.stats().unwrap().in_frames, 2);
    }

    #[test]
    fn channel_must_be_listed() {
        let r = radio().with_channels(vec![3, 4]);
        assert_eq!(r.channel(), Ok(3));
        assert_eq!(r.set_channel(9), Err(HalError::InvalidChannel(9)));
        r.set_channel(4).unwrap();
        assert_eq!(r.channel(), Ok(4));
    }
}
