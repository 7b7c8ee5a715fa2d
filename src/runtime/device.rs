//! Emulated device and kernel handles.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use super::design::Design;
use super::run::{KernelArg, Run};
use super::xclbin::Xclbin;
use super::RuntimeError;

/// Handle to the emulated NPU.
#[derive(Debug, Clone)]
pub struct Device {
    index: u32,
    next_bo: Arc<AtomicU32>,
    xclbin_uuid: Option<uuid::Uuid>,
}

impl Device {
    /// Open device `index`. The emulator exposes a single device, index 0.
    pub fn open(index: u32) -> Result<Self, RuntimeError> {
        if index != 0 {
            return Err(RuntimeError::DeviceNotFound(index));
        }
        log::debug!("opened emulated device {}", index);
        Ok(Self {
            index,
            next_bo: Arc::new(AtomicU32::new(0)),
            xclbin_uuid: None,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// UUID of the registered xclbin, if any.
    pub fn xclbin_uuid(&self) -> Option<uuid::Uuid> {
        self.xclbin_uuid
    }

    pub(crate) fn next_bo_id(&self) -> &AtomicU32 {
        &self.next_bo
    }

    /// Register `xclbin` (if given) and open the kernel whose name starts with
    /// `name`, bound to `design`.
    ///
    /// Without an xclbin the design is loaded directly under `name`.
    pub fn load_kernel(
        &mut self,
        xclbin: Option<&Xclbin>,
        name: &str,
        design: Design,
    ) -> Result<Kernel, RuntimeError> {
        let name = match xclbin {
            Some(xclbin) => {
                let available = xclbin.kernel_names();
                let found = available.iter().find(|k| k.starts_with(name)).cloned();
                let Some(found) = found else {
                    return Err(RuntimeError::KernelNotFound { name: name.to_string(), available });
                };
                self.xclbin_uuid = Some(xclbin.uuid());
                log::info!("registered xclbin {} for kernel '{}'", xclbin.uuid(), found);
                found
            }
            None => {
                log::info!("no xclbin given, loading design '{}' as '{}'", design.name(), name);
                name.to_string()
            }
        };

        Ok(Kernel { name, design })
    }
}

/// A kernel opened on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    name: String,
    design: Design,
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn design(&self) -> Design {
        self.design
    }

    /// Memory group of argument `arg`.
    pub fn group_id(&self, arg: usize) -> Result<u32, RuntimeError> {
        if self.design.is_buffer_arg(arg) {
            Ok(arg as u32)
        } else {
            Err(RuntimeError::NotABufferArg { kernel: self.name.clone(), arg })
        }
    }

    /// Bind `args` positionally and start a run.
    pub fn call(&self, args: impl IntoIterator<Item = KernelArg>) -> Result<Run, RuntimeError> {
        let mut run = Run::new(self);
        for (idx, arg) in args.into_iter().enumerate() {
            run.set_arg(idx, arg);
        }
        run.start()?;
        Ok(run)
    }
}
