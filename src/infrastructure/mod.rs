//! Adapters around the outside world: BLE stacks, host input, operator
//! terminal and logging.

#[cfg(windows)]
pub mod bluetooth;
#[cfg(feature = "btleplug")]
pub mod btleplug_transport;
pub mod input_simulator;
pub mod logging;
pub mod operator_input;
pub mod transport;
#[cfg(target_os = "linux")]
pub mod uinput;

use transport::BleCentral;

/// The BLE transport compiled in for this platform
pub async fn platform_central() -> anyhow::Result<Box<dyn BleCentral>> {
    #[cfg(feature = "btleplug")]
    {
        Ok(Box::new(btleplug_transport::BtleplugCentral::new().await?))
    }

    #[cfg(all(windows, not(feature = "btleplug")))]
    {
        Ok(Box::new(bluetooth::WinRtCentral::new()))
    }

    #[cfg(not(any(windows, feature = "btleplug")))]
    {
        anyhow::bail!(
            "No BLE transport for this platform in this build; rebuild with `--features btleplug`"
        )
    }
}
