//! Linux virtual wheel through `/dev/uinput`

use super::input_simulator::{InputSink, WheelAxis};
use anyhow::Context;
use evdev::uinput::VirtualDevice;
use evdev::{AttributeSet, EventType, InputEvent, RelativeAxisCode};
use tracing::{debug, info};

const DEVICE_NAME: &str = "Scroll Wheel (BLE)";

/// A uinput device exposing `REL_WHEEL_HI_RES` and `REL_WHEEL`
pub struct UinputSink {
    device: VirtualDevice,
}

impl UinputSink {
    pub fn new() -> anyhow::Result<Self> {
        let mut axes = AttributeSet::<RelativeAxisCode>::new();
        axes.insert(RelativeAxisCode::REL_WHEEL_HI_RES);
        axes.insert(RelativeAxisCode::REL_WHEEL);

        let device = VirtualDevice::builder()
            .context("Open /dev/uinput (is the uinput module loaded and writable?)")?
            .name(DEVICE_NAME)
            .with_relative_axes(&axes)?
            .build()
            .context("Create virtual wheel device")?;

        info!("Virtual input device \"{}\" created", DEVICE_NAME);
        Ok(Self { device })
    }
}

impl InputSink for UinputSink {
    fn emit_relative(&mut self, axis: WheelAxis, value: i32) -> anyhow::Result<()> {
        let code = match axis {
            WheelAxis::HiRes => RelativeAxisCode::REL_WHEEL_HI_RES,
            WheelAxis::Coarse => RelativeAxisCode::REL_WHEEL,
        };
        debug!("uinput {:?} {}", code, value);
        // emit() appends the SYN_REPORT
        self.device
            .emit(&[InputEvent::new(EventType::RELATIVE.0, code.0, value)])
            .context("Write wheel event")?;
        Ok(())
    }
}
