use core::fmt;

use nema_protocol::nema_regs::{OP_SUBMIT_CMD, OP_SUBMIT_CMD_LIST, REG_OP, REG_SIG, SIG_ACK};
use nema_protocol::{decode_cmd_list_le, NemaRegion, NEMA_CMD_LIST_SIZE_BYTES};
use slate_interrupts::IrqLine;
use slate_memory::{MemoryView, MmioHandler, SharedGuestMemory};

use crate::clip::ClipState;
use crate::config::{FaultPolicy, NemaDeviceConfig};
use crate::error::{ListFault, NemaError};
use crate::executor::{trace_cmd_list, CommandListExecutor};
use crate::surface::SurfaceAcquirer;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NemaStats {
    pub lists_completed: u64,
    pub records_executed: u64,
    pub draw_calls: u64,
    /// Completion interrupt assertions; one per completed list, never coalesced.
    pub irq_raises: u64,
    pub faults: u64,
}

/// The NEMA software GPU.
///
/// The guest writes a command list block into memory, then writes [`OP_SUBMIT_CMD_LIST`] to
/// [`REG_OP`]. The list runs to completion inside that register write and the completion line is
/// raised; writing [`SIG_ACK`] to [`REG_SIG`] lowers it again.
pub struct NemaDevice {
    cfg: NemaDeviceConfig,
    primary: MemoryView,
    assets: MemoryView,
    irq: Box<dyn IrqLine>,
    irq_level: bool,
    clip: ClipState,
    stats: NemaStats,
    last_fault: Option<ListFault>,
}

impl fmt::Debug for NemaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NemaDevice")
            .field("cfg", &self.cfg)
            .field("irq_level", &self.irq_level)
            .field("clip", &self.clip)
            .field("stats", &self.stats)
            .field("last_fault", &self.last_fault)
            .finish_non_exhaustive()
    }
}

impl NemaDevice {
    /// `primary` is the guest physical address space (command lists, destinations, sources);
    /// `assets` backs the read-only asset window.
    pub fn new(
        cfg: NemaDeviceConfig,
        primary: SharedGuestMemory,
        assets: SharedGuestMemory,
        irq: Box<dyn IrqLine>,
    ) -> Self {
        Self {
            cfg,
            primary: MemoryView::new(primary),
            assets: MemoryView::new(assets),
            irq,
            irq_level: false,
            clip: ClipState::new(),
            stats: NemaStats::default(),
            last_fault: None,
        }
    }

    pub fn config(&self) -> &NemaDeviceConfig {
        &self.cfg
    }

    pub fn irq_level(&self) -> bool {
        self.irq_level
    }

    pub fn clip(&self) -> Option<NemaRegion> {
        self.clip.region()
    }

    pub fn stats(&self) -> NemaStats {
        self.stats
    }

    pub fn last_fault(&self) -> Option<&ListFault> {
        self.last_fault.as_ref()
    }

    /// Snapshot the command list block and execute it.
    ///
    /// On success the completion line is raised. A fault stops the list at the failing record,
    /// commits the destination, leaves the line alone and is remembered as [`Self::last_fault`].
    pub fn submit_command_list(&mut self) -> Result<(), ListFault> {
        let result = self.run_command_list();
        match &result {
            Ok(()) => {
                self.stats.lists_completed += 1;
                self.raise_irq();
            }
            Err(fault) => {
                self.stats.faults += 1;
                self.last_fault = Some(fault.clone());
            }
        }
        result
    }

    fn run_command_list(&mut self) -> Result<(), ListFault> {
        let map = self.cfg.memory_map;
        if map.cmd_list_window_size < NEMA_CMD_LIST_SIZE_BYTES as u64 {
            return Err(ListFault::list(NemaError::MappingTruncated {
                paddr: map.cmd_list_base,
                requested: NEMA_CMD_LIST_SIZE_BYTES,
                mapped: map.cmd_list_window_size,
            }));
        }

        let block = self
            .primary
            .read_copy(map.cmd_list_base, NEMA_CMD_LIST_SIZE_BYTES)
            .map_err(|err| ListFault::list(err.into()))?;
        let list = decode_cmd_list_le(&block).map_err(|err| ListFault::list(err.into()))?;
        if self.cfg.trace_command_lists {
            trace_cmd_list(&list);
        }

        let acquirer = SurfaceAcquirer::new(
            &self.primary,
            &self.assets,
            map.asset_window,
            self.cfg.trace_masks,
        );
        CommandListExecutor::new(acquirer, &mut self.clip, &mut self.stats).run(&list)
    }

    /// Lower the completion line.
    pub fn acknowledge(&mut self) {
        self.irq_level = false;
        self.irq.set_level(false);
    }

    fn raise_irq(&mut self) {
        self.irq_level = true;
        self.stats.irq_raises += 1;
        self.irq.set_level(true);
    }

    fn handle_fault(&self, fault: &ListFault) {
        tracing::error!(kind = ?fault.kind(), %fault, "NEMA command list faulted");
        if self.cfg.fault_policy == FaultPolicy::Abort {
            std::process::exit(1);
        }
    }
}

impl MmioHandler for NemaDevice {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        tracing::trace!(offset, size, "NEMA register read");
        0
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        match offset {
            REG_OP if value == u64::from(OP_SUBMIT_CMD_LIST) => {
                if let Err(fault) = self.submit_command_list() {
                    self.handle_fault(&fault);
                }
            }
            REG_OP if value == u64::from(OP_SUBMIT_CMD) => {
                tracing::debug!("single command submission is not supported; ignoring");
            }
            REG_SIG if value == u64::from(SIG_ACK) => self.acknowledge(),
            _ => tracing::debug!(offset, size, value, "ignoring NEMA register write"),
        }
    }
}
