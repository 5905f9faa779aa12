use nema_protocol::nema_regs::{
    NEMA_ASSET_WINDOW_END, NEMA_ASSET_WINDOW_START, NEMA_CMD_LIST_BASE, NEMA_CMD_LIST_WINDOW_SIZE,
};

/// Read-only asset address range, aliased onto a separate address space.
///
/// An address strictly between `start` and `end` resolves to `addr - start` in the asset space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssetWindow {
    pub start: u64,
    pub end: u64,
}

impl Default for AssetWindow {
    fn default() -> Self {
        Self {
            start: NEMA_ASSET_WINDOW_START,
            end: NEMA_ASSET_WINDOW_END,
        }
    }
}

impl AssetWindow {
    /// Translate `paddr` into the asset space, or `None` if it is a primary memory address.
    pub fn translate(&self, paddr: u64) -> Option<u64> {
        (paddr > self.start && paddr < self.end).then(|| paddr - self.start)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryMap {
    /// Guest physical address of the command list block.
    pub cmd_list_base: u64,
    pub cmd_list_window_size: u64,
    pub asset_window: AssetWindow,
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self {
            cmd_list_base: NEMA_CMD_LIST_BASE,
            cmd_list_window_size: NEMA_CMD_LIST_WINDOW_SIZE,
            asset_window: AssetWindow::default(),
        }
    }
}

/// What the register path does with a faulted submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultPolicy {
    /// Log and terminate the process with exit status 1.
    #[default]
    Abort,
    /// Log, keep running, and expose the fault through `NemaDevice::last_fault`.
    Report,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NemaDeviceConfig {
    pub memory_map: MemoryMap,
    pub fault_policy: FaultPolicy,
    /// Dump every acquired command list at TRACE level.
    pub trace_command_lists: bool,
    /// Dump every acquired mask at TRACE level.
    pub trace_masks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_window_bounds_are_exclusive() {
        let w = AssetWindow::default();
        assert_eq!(w.translate(0x1000_0000), None);
        assert_eq!(w.translate(0x1000_0001), Some(1));
        assert_eq!(w.translate(0x1fff_ffff), Some(0x0fff_ffff));
        assert_eq!(w.translate(0x2000_0000), None);
        assert_eq!(w.translate(0x2200_0000), None);
    }

    #[test]
    fn default_config_aborts_on_fault() {
        let cfg = NemaDeviceConfig::default();
        assert_eq!(cfg.fault_policy, FaultPolicy::Abort);
        assert_eq!(cfg.memory_map.cmd_list_base, 0x2220_1000);
        assert!(!cfg.trace_command_lists);
    }
}
