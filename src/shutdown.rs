//! Signal handling and fan restore on exit.
//!
//! The signal handler only notifies the control loop through a channel. All
//! device work, including restoring the automatic fan policy, happens on the
//! main thread through [`FanRestoreGuard`].

use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use crate::device::GpuDevice;
use crate::error::{Result, TunerError};

// =============================================================================
// ShutdownSignal
// =============================================================================

/// Receiving end of a shutdown request.
pub struct ShutdownSignal {
    receiver: Receiver<()>,
    requested: Cell<bool>,
}

impl ShutdownSignal {
    /// Install the process-wide handler for SIGINT, SIGTERM and SIGHUP.
    ///
    /// Can only be called once per process.
    pub fn install() -> Result<Self> {
        let (sender, signal) = Self::channel();

        ctrlc::set_handler(move || {
            let _ = sender.send(());
        })
        .map_err(|e| TunerError::Signal(e.to_string()))?;

        Ok(signal)
    }

    /// A signal triggered by sending on the returned sender.
    pub fn channel() -> (Sender<()>, Self) {
        let (sender, receiver) = mpsc::channel();
        (
            sender,
            Self {
                receiver,
                requested: Cell::new(false),
            },
        )
    }

    /// Block for up to `timeout`. Returns true once shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.requested.get() {
            return true;
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(()) => {
                info!("Shutdown requested");
                self.requested.set(true);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                // Nobody can ask us to stop any more; keep the cadence.
                thread::sleep(timeout);
                false
            }
        }
    }

    /// Non-blocking check.
    pub fn is_requested(&self) -> bool {
        if !self.requested.get() && self.receiver.try_recv().is_ok() {
            info!("Shutdown requested");
            self.requested.set(true);
        }
        self.requested.get()
    }
}

// =============================================================================
// FanRestoreGuard
// =============================================================================

/// Restores the automatic fan policy when the control loop ends.
///
/// Call [`finish`](Self::finish) on the normal exit path to get the result.
/// If the guard is dropped instead (early return or panic) the restore still
/// runs and failures are logged.
pub struct FanRestoreGuard<'a, D: GpuDevice + ?Sized> {
    device: &'a D,
    armed: bool,
}

impl<'a, D: GpuDevice + ?Sized> FanRestoreGuard<'a, D> {
    pub fn new(device: &'a D) -> Self {
        Self {
            device,
            armed: true,
        }
    }

    pub fn device(&self) -> &'a D {
        self.device
    }

    /// Restore now and report the outcome.
    pub fn finish(mut self) -> Result<()> {
        self.armed = false;
        self.device.restore_default_fan_speed()
    }
}

impl<D: GpuDevice + ?Sized> Drop for FanRestoreGuard<'_, D> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.device.restore_default_fan_speed() {
            error!("Failed to restore default fan speed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Instant;

    #[derive(Default)]
    struct RecordingDevice {
        restores: RefCell<u32>,
        fail_restore: bool,
    }

    impl GpuDevice for RecordingDevice {
        fn temperature(&self) -> Result<u32> {
            Ok(50)
        }

        fn current_fan_speed(&self) -> Result<Option<u32>> {
            Ok(None)
        }

        fn set_fan_speed(&self, _speed: u32) -> Result<()> {
            Ok(())
        }

        fn restore_default_fan_speed(&self) -> Result<()> {
            *self.restores.borrow_mut() += 1;
            if self.fail_restore {
                Err(TunerError::Unsupported {
                    feature: "default fan speed",
                })
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_wait_times_out_without_request() {
        let (_sender, signal) = ShutdownSignal::channel();
        let start = Instant::now();
        assert!(!signal.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!signal.is_requested());
    }

    #[test]
    fn test_request_is_sticky() {
        let (sender, signal) = ShutdownSignal::channel();
        sender.send(()).unwrap();

        assert!(signal.wait(Duration::from_secs(5)));
        assert!(signal.wait(Duration::from_secs(5)));
        assert!(signal.is_requested());
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let device = RecordingDevice::default();
        {
            let _guard = FanRestoreGuard::new(&device);
        }
        assert_eq!(*device.restores.borrow(), 1);
    }

    #[test]
    fn test_finish_restores_once_and_reports() {
        let device = RecordingDevice {
            fail_restore: true,
            ..RecordingDevice::default()
        };
        let guard = FanRestoreGuard::new(&device);
        assert!(guard.finish().is_err());
        assert_eq!(*device.restores.borrow(), 1);
    }

    #[test]
    fn test_guard_restores_during_unwind() {
        let device = RecordingDevice::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = FanRestoreGuard::new(&device);
            panic!("control loop failed");
        }));
        assert!(result.is_err());
        assert_eq!(*device.restores.borrow(), 1);
    }
}
