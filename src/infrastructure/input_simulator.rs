//! Host input sinks
//!
//! The dispatcher only needs "emit relative motion on an axis". Each
//! platform provides its own sink; [`LogSink`] records motion in the log and
//! stands in where no native sink exists.

use tracing::{debug, info};

/// One wheel detent in high-resolution units (Windows `WHEEL_DELTA`, Linux
/// `REL_WHEEL_HI_RES` granularity)
pub const WHEEL_DELTA: i32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelAxis {
    /// High-resolution vertical wheel, 120 units per detent
    HiRes,
    /// Legacy detent-based vertical wheel
    Coarse,
}

/// Sink for relative input events. No acknowledgment beyond the I/O result.
pub trait InputSink: Send {
    fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()>;
}

impl<S: InputSink + ?Sized> InputSink for Box<S> {
    fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()> {
        (**self).emit_relative(axis, value)
    }
}

/// Logs wheel motion instead of injecting it
#[derive(Debug, Default)]
pub struct LogSink;

impl InputSink for LogSink {
    fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()> {
        info!("Wheel {:?}: {}", axis, value);
        Ok(())
    }
}

/// Pick the native sink for this platform, or [`LogSink`] for dry runs
pub fn platform_sink(dry_run: bool) -> anyhow::Result<Box<dyn InputSink>> {
    if dry_run {
        info!("Dry run: wheel motion is logged, not injected");
        return Ok(Box::new(LogSink));
    }

    #[cfg(windows)]
    {
        Ok(Box::new(windows_sink::SendInputSink::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(super::uinput::UinputSink::new()?))
    }

    #[cfg(not(any(windows, target_os = "linux")))]
    {
        tracing::warn!("No native input sink on this platform, logging wheel motion only");
        Ok(Box::new(LogSink))
    }
}

#[cfg(windows)]
mod windows_sink {
    use super::{debug, InputSink, WheelAxis, WHEEL_DELTA};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_WHEEL, MOUSEINPUT,
    };

    /// Injects wheel events through `SendInput`.
    ///
    /// Windows wheel data is already high-resolution, so `HiRes` deltas are
    /// passed through unscaled and `Coarse` detents are multiplied by
    /// `WHEEL_DELTA`.
    pub struct SendInputSink;

    impl SendInputSink {
        pub fn new() -> Self {
            Self
        }
    }

    impl InputSink for SendInputSink {
        fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()> {
            let data = match axis {
                WheelAxis::HiRes => value,
                WheelAxis::Coarse => value.saturating_mul(WHEEL_DELTA),
            };
            debug!("Mouse Wheel Scroll: {} ({:?})", data, axis);

            let input = INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx: 0,
                        dy: 0,
                        mouseData: data as u32,
                        dwFlags: MOUSEEVENTF_WHEEL,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
            };
            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            if sent != 1 {
                anyhow::bail!("SendInput injected {} of 1 events", sent);
            }
            Ok(())
        }
    }
}
