//! Devices command - list compute adapters

use anyhow::{Result, bail};
use xform_compute::adapters;

use super::GlobalOpts;

pub fn run(opts: &GlobalOpts) -> Result<()> {
    let config = opts.config();
    let list = adapters(&config);
    if list.is_empty() {
        bail!("No adapters found for backends {:?}", config.backends);
    }

    for adapter in &list {
        let marker = if adapter.index == config.adapter_index { "*" } else { " " };
        println!("{marker} {adapter}");
    }
    Ok(())
}
