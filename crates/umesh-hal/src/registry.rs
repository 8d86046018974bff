//! Ordered registry of radio modules with default-module dispatch.

use std::sync::Arc;

use umesh_core::{MacAddress, MediaType};

use crate::error::HalError;
use crate::traits::{
    ExtNetId, Frame, FrameStats, HalModule, ReceiveCallback, SentCallback,
};

/// Handle to a module inside a [`HalRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub usize);

/// Registered radio modules, in registration order.
///
/// Modules are never removed once registered, so a [`ModuleId`] stays valid
/// for the registry's lifetime.
#[derive(Default)]
pub struct HalRegistry {
    modules: Vec<Arc<dyn HalModule>>,
}

/// Resolve an optional module and forward a capability call to it.
macro_rules! dispatch {
    ($self:ident, $module:expr, $method:ident $(, $arg:expr)*) => {
        $self.resolve($module)?.$method($($arg),*)
    };
}

impl HalRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Append a module. Registering the same module twice returns its existing handle.
    pub fn register(&mut self, module: Arc<dyn HalModule>) -> ModuleId {
        if let Some(pos) = self.modules.iter().position(|m| Arc::ptr_eq(m, &module)) {
            return ModuleId(pos);
        }
        tracing::debug!(
            name = module.name(),
            media = module.media_type().name(),
            "hal: registered module"
        );
        self.modules.push(module);
        ModuleId(self.modules.len() - 1)
    }

    /// First registered module, if any.
    pub fn get_default(&self) -> Option<ModuleId> {
        if self.modules.is_empty() {
            None
        } else {
            Some(ModuleId(0))
        }
    }

    /// Module registered after `current`, or `None` at the tail.
    pub fn get_next(&self, current: ModuleId) -> Option<ModuleId> {
        let next = current.0 + 1;
        (next < self.modules.len()).then_some(ModuleId(next))
    }

    pub fn module(&self, id: ModuleId) -> Option<&Arc<dyn HalModule>> {
        self.modules.get(id.0)
    }

    /// Iterate handles in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ModuleId> + '_ {
        (0..self.modules.len()).map(ModuleId)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Run every module's low-level init, stopping at the first failure.
    pub fn init_all(&self) -> Result<(), HalError> {
        for module in &self.modules {
            module.init().inspect_err(|e| {
                tracing::warn!(name = module.name(), "hal: module init failed: {e}");
            })?;
        }
        Ok(())
    }

    fn resolve(&self, module: Option<ModuleId>) -> Result<&dyn HalModule, HalError> {
        let id = module
            .or_else(|| self.get_default())
            .ok_or(HalError::Unsupported)?;
        self.modules
            .get(id.0)
            .map(|m| m.as_ref())
            .ok_or(HalError::Unsupported)
    }

    // -- Capability dispatch --

    pub fn media_type(&self, module: Option<ModuleId>) -> Result<MediaType, HalError> {
        Ok(self.resolve(module)?.media_type())
    }

    pub fn enable(&self, module: Option<ModuleId>) -> Result<(), HalError> {
        dispatch!(self, module, enable)
    }

    pub fn disable(&self, module: Option<ModuleId>) -> Result<(), HalError> {
        dispatch!(self, module, disable)
    }

    pub fn send_ucast(
        &self,
        module: Option<ModuleId>,
        frame: &Frame,
        dest: &MacAddress,
        sent: Option<SentCallback>,
    ) -> Result<(), HalError> {
        dispatch!(self, module, send_ucast, frame, dest, sent)
    }

    pub fn send_bcast(
        &self,
        module: Option<ModuleId>,
        frame: &Frame,
        sent: Option<SentCallback>,
    ) -> Result<(), HalError> {
        dispatch!(self, module, send_bcast, frame, sent)
    }

    pub fn register_receiver(
        &self,
        module: Option<ModuleId>,
        received: ReceiveCallback,
    ) -> Result<(), HalError> {
        dispatch!(self, module, register_receiver, received)
    }

    pub fn get_ucast_mtu(&self, module: Option<ModuleId>) -> Result<usize, HalError> {
        dispatch!(self, module, ucast_mtu)
    }

    pub fn get_bcast_mtu(&self, module: Option<ModuleId>) -> Result<usize, HalError> {
        dispatch!(self, module, bcast_mtu)
    }

    pub fn set_channel(&self, module: Option<ModuleId>, channel: u8) -> Result<(), HalError> {
        dispatch!(self, module, set_channel, channel)
    }

    pub fn get_channel(&self, module: Option<ModuleId>) -> Result<u8, HalError> {
        dispatch!(self, module, channel)
    }

    pub fn get_channel_list(&self, module: Option<ModuleId>) -> Result<Vec<u8>, HalError> {
        dispatch!(self, module, channel_list)
    }

    pub fn set_txpower(&self, module: Option<ModuleId>, power: i8) -> Result<(), HalError> {
        dispatch!(self, module, set_txpower, power)
    }

    pub fn get_txpower(&self, module: Option<ModuleId>) -> Result<i8, HalError> {
        dispatch!(self, module, txpower)
    }

    pub fn set_extnetid(
        &self,
        module: Option<ModuleId>,
        extnetid: &ExtNetId,
    ) -> Result<(), HalError> {
        dispatch!(self, module, set_extnetid, extnetid)
    }

    pub fn get_extnetid(&self, module: Option<ModuleId>) -> Result<ExtNetId, HalError> {
        dispatch!(self, module, extnetid)
    }

    pub fn get_mac_address(&self, module: Option<ModuleId>) -> Result<MacAddress, HalError> {
        dispatch!(self, module, mac_address)
    }

    pub fn radio_wakeup(&self, module: Option<ModuleId>) -> Result<(), HalError> {
        dispatch!(self, module, radio_wakeup)
    }

    pub fn radio_sleep(&self, module: Option<ModuleId>) -> Result<(), HalError> {
        dispatch!(self, module, radio_sleep)
    }

    pub fn get_stats(&self, module: Option<ModuleId>) -> Result<FrameStats, HalError> {
        dispatch!(self, module, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRadio;

    fn wifi() -> Arc<SimRadio> {
        Arc::new(SimRadio::new(
            "wifi0",
            MediaType::Wifi,
            MacAddress::eui48([2, 0, 0, 0, 0, 1]),
        ))
    }

    fn ble() -> Arc<SimRadio> {
        Arc::new(SimRadio::new(
            "ble0",
            MediaType::Ble,
            MacAddress::eui48([2, 0, 0, 0, 0, 2]),
        ))
    }

    #[test]
    fn empty_registry_is_unsupported() {
        let reg = HalRegistry::new();
        assert!(reg.get_default().is_none());
        assert_eq!(reg.enable(None), Err(HalError::Unsupported));
        assert_eq!(reg.get_ucast_mtu(None), Err(HalError::Unsupported));
        assert_eq!(reg.media_type(None), Err(HalError::Unsupported));
    }

    #[test]
    fn register_is_idempotent() {
        let mut reg = HalRegistry::new();
        let radio = wifi();
        let a = reg.register(radio.clone());
        let b = reg.register(radio);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn traversal_follows_registration_order() {
        let mut reg = HalRegistry::new();
        let first = reg.register(wifi());
        let second = reg.register(ble());

        assert_eq!(reg.get_default(), Some(first));
        assert_eq!(reg.get_next(first), Some(second));
        assert_eq!(reg.get_next(second), None);
        assert_eq!(reg.ids().collect::<Vec<_>>(), vec![first, second]);
    }

    #[test]
    fn omitted_module_resolves_to_default() {
        let mut reg = HalRegistry::new();
        reg.register(wifi());
        let ble_id = reg.register(ble());

        assert_eq!(reg.media_type(None), Ok(MediaType::Wifi));
        assert_eq!(reg.media_type(Some(ble_id)), Ok(MediaType::Ble));
    }

    #[test]
    fn unknown_module_id_is_unsupported() {
        let mut reg = HalRegistry::new();
        reg.register(wifi());
        assert_eq!(reg.enable(Some(ModuleId(7))), Err(HalError::Unsupported));
    }

    #[test]
    fn dispatch_reaches_the_module() {
        let mut reg = HalRegistry::new();
        let radio = wifi();
        let id = reg.register(radio.clone());

        reg.enable(Some(id)).unwrap();
        assert!(radio.is_enabled());

        reg.set_channel(None, 6).unwrap();
        assert_eq!(reg.get_channel(None), Ok(6));

        reg.send_bcast(None, &Frame::new(vec![1, 2, 3]), None)
            .unwrap();
        let sent = radio.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].frame.data, vec![1, 2, 3]);
        assert!(sent[0].dest.is_none());

        assert_eq!(reg.get_stats(None).unwrap().out_frames, 1);
    }

    #[test]
    fn init_all_runs_each_module() {
        let mut reg = HalRegistry::new();
        let a = wifi();
        let b = ble();
        reg.register(a.clone());
        reg.register(b.clone());
        reg.init_all().unwrap();
        assert!(a.is_initialized());
        assert!(b.is_initialized());
    }
}
