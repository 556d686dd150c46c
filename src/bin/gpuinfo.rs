// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Prints every device the default instance can see.

use kernels_and_words::device::{Instance, InstanceConfig};

fn main() -> std::process::ExitCode {
    let instance = match Instance::new(&InstanceConfig::default()) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("could not open an instance: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };
    for (index, device) in instance.devices().iter().enumerate() {
        println!("Device {index}");
        print!("{device}");
        println!();
    }
    std::process::ExitCode::SUCCESS
}
