//! `devices` subcommand — list connected USBPre devices.

use super::{DevicesOutput, Result, USBPRE, device, print_json};

pub(super) fn cmd_devices(json: bool) -> Result<()> {
    let devices = device::enumerate_devices(&USBPRE);

    if json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No USBPre devices found.");
        return Ok(());
    }

    println!(
        "Found {} USBPre device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!("  [{}] {}", i + 1, dev.path);
        if let Some(ref product) = dev.product {
            println!("      Product: {product}");
        }
        if let Some(ref serial) = dev.serial {
            println!("      Serial:  {serial}");
        }
    }

    Ok(())
}
