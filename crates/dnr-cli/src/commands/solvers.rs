//! `dnr solvers`: compiled optimization backends.

use anyhow::Result;
use dnr_algo::BackendKind;
use dnr_core::DnrError;

pub fn handle(probe: bool) -> Result<()> {
    let mut failures = Vec::new();
    println!("Compiled optimization backends:");
    for name in BackendKind::available() {
        if !probe {
            println!("  {name}");
            continue;
        }
        let checked = name
            .parse::<BackendKind>()
            .and_then(|kind| kind.create().probe());
        match checked {
            Ok(()) => println!("  {name}\tok"),
            Err(err) => {
                println!("  {name}\tunavailable ({err})");
                failures.push(name.to_string());
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DnrError::BackendUnavailable(format!("probe failed for {}", failures.join(", "))).into())
    }
}
