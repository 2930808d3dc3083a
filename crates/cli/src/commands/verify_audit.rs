//! `chatscout verify-audit`: check an audit trail's hash chain.

use chatscout_observers::verify_chain;
use std::path::Path;

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let entries = verify_chain(path)?;
    println!("✅ {}: {entries} entries, chain intact", path.display());
    Ok(())
}
