//! UVC Gadget Manager - lifecycle of the gadget
//!
//! The manager holds no state of its own beyond read-only configuration:
//! every command starts by re-inspecting the tree, since other tools or the
//! kernel may have changed it since the last call.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::configfs::ConfigFs;
use super::format::{FormatGroup, FrameSpec};
use super::host::HostDevices;
use super::registry::FrameRegistry;
use super::state::{inspect, report, GadgetState, StatusReport};
use super::tree::{DescriptorTree, GadgetIdentity};
use crate::error::{AppError, Result};

/// Default settling delay between remove and start in `restart`
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1000;

/// Gadget configuration manager
pub struct UvcGadgetManager<F: ConfigFs, H: HostDevices> {
    fs: F,
    host: H,
    gadget_name: String,
    identity: GadgetIdentity,
    tree: DescriptorTree,
    registry: FrameRegistry,
    settle_delay: Duration,
}

impl<F: ConfigFs, H: HostDevices> UvcGadgetManager<F, H> {
    pub fn new(
        fs: F,
        host: H,
        gadget_name: &str,
        identity: GadgetIdentity,
        tree: DescriptorTree,
        registry: FrameRegistry,
    ) -> Self {
        Self {
            fs,
            host,
            gadget_name: gadget_name.to_string(),
            identity,
            tree,
            registry,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }

    /// Override the restart settling delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn tree(&self) -> &DescriptorTree {
        &self.tree
    }

    /// Current state, recomputed from the tree
    pub fn state(&self) -> GadgetState {
        inspect(&self.fs, &self.tree)
    }

    /// Build if needed and bind to a controller
    pub fn start(&self) -> Result<StatusReport> {
        match self.state() {
            GadgetState::Enabled => {
                info!("Gadget {} already enabled", self.gadget_name);
                return self.status();
            }
            GadgetState::Configured => {
                info!("Gadget {} configured, enabling", self.gadget_name);
            }
            GadgetState::Incomplete => {
                warn!(
                    "Gadget {} is only partially built, rebuilding",
                    self.gadget_name
                );
                self.tree.teardown(&self.fs)?;
                self.build()?;
            }
            GadgetState::Absent => {
                self.build()?;
            }
        }

        self.bind()?;
        info!("Gadget {} enabled", self.gadget_name);
        self.status()
    }

    /// Unbind from the controller, keep the configuration
    pub fn stop(&self) -> Result<()> {
        if self.tree.bound_udc(&self.fs).is_none() {
            info!("Gadget {} not bound, nothing to stop", self.gadget_name);
            return Ok(());
        }
        self.tree.unbind(&self.fs)
    }

    /// Remove, wait for the controller to settle, start again.
    ///
    /// Rebuilds from the static registry only; frames added at runtime
    /// are lost.
    pub fn restart(&self) -> Result<StatusReport> {
        self.remove()?;
        if !self.settle_delay.is_zero() {
            info!(
                "Waiting {} ms for the controller to settle",
                self.settle_delay.as_millis()
            );
            thread::sleep(self.settle_delay);
        }
        self.start()
    }

    /// Unbind (best effort) and tear the whole tree down
    pub fn remove(&self) -> Result<()> {
        if !self.state().exists() {
            info!("Gadget {} not present, nothing to remove", self.gadget_name);
            return Ok(());
        }
        if let Err(e) = self.stop() {
            warn!("Failed to unbind gadget before removal: {}", e);
        }
        self.tree.teardown(&self.fs)
    }

    /// Add one frame to an existing function.
    ///
    /// A live gadget is unbound for the duration of the change so the
    /// controller never sees a half-updated descriptor set, then rebound.
    pub fn add(
        &self,
        name: &str,
        width: u32,
        height: u32,
        intervals: Vec<u32>,
        format: &str,
    ) -> Result<StatusReport> {
        let format: FormatGroup = format.parse()?;
        let spec = FrameSpec::new(name, format, width, height, intervals)?;
        self.add_frame(&spec)
    }

    /// Typed form of [`Self::add`]
    pub fn add_frame(&self, spec: &FrameSpec) -> Result<StatusReport> {
        let layout = self.tree.layout();
        if !self.fs.exists(layout.function()) {
            return Err(AppError::Precondition(format!(
                "Function {} does not exist, run start first",
                layout.function_name()
            )));
        }

        // Everything checkable is checked before the first mutation
        spec.validate()?;
        if let Some(existing) = self.tree.function().find_frame(&self.fs, layout, &spec.name)? {
            return Err(AppError::Validation(format!(
                "Frame '{}' already exists in the {} group",
                spec.name, existing
            )));
        }

        let was_enabled = self.state() == GadgetState::Enabled;
        if was_enabled {
            info!("Temporarily disabling gadget {} to add {}", self.gadget_name, spec.name);
            self.tree.unbind(&self.fs)?;
        }

        // Linked formats are locked by the kernel
        self.tree.unlink_all(&self.fs)?;
        self.tree.add_frame(&self.fs, spec)?;
        self.tree.link_all(&self.fs)?;
        info!("Added frame {}", spec);

        if was_enabled {
            self.bind()?;
        }
        self.status()
    }

    /// Read-only state and frame report
    pub fn status(&self) -> Result<StatusReport> {
        report(&self.fs, &self.host, &self.tree, &self.gadget_name)
    }

    /// Full build from the static registry
    fn build(&self) -> Result<()> {
        info!(
            "Building gadget {} with {} frames",
            self.gadget_name,
            self.registry.frames().len()
        );
        self.tree.create_gadget(&self.fs, &self.identity)?;
        self.tree.create_function(&self.fs)?;
        for spec in self.registry.frames() {
            self.tree.add_frame(&self.fs, spec)?;
        }
        self.tree.link_all(&self.fs)
    }

    /// Bind to the first available controller
    fn bind(&self) -> Result<()> {
        let udc = self.host.udcs().into_iter().next().ok_or_else(|| {
            AppError::Device("No USB Device Controller (UDC) found".to_string())
        })?;

        if let Err(e) = self.tree.relink_config(&self.fs) {
            warn!("Failed to recreate gadget config link before bind: {}", e);
        }

        self.tree.bind(&self.fs, &udc)
    }
}
