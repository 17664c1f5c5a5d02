use std::error::Error;

use clap::Args;
use xeda_flow::FlowKind;

#[derive(Args, Debug)]
pub struct FlowsArgs {}

pub fn run(_args: &FlowsArgs) -> Result<(), Box<dyn Error>> {
    for kind in FlowKind::ALL {
        let descriptor = kind.descriptor()?;
        let depends: Vec<&str> = descriptor
            .depends_on
            .iter()
            .map(|dependency| dependency.kind.name())
            .collect();
        if depends.is_empty() {
            println!("{}", kind.name());
        } else {
            println!("{} (depends on: {})", kind.name(), depends.join(", "));
        }
    }
    Ok(())
}
