//! `entrywatch matrix` - print the reference four-scenario configuration

use clap::Args;

use crate::config::RunConfig;
use crate::Result;

/// Print a starter config covering fixed and mirror routing, open and secured
#[derive(Args, Debug)]
pub struct MatrixArgs {}

/// Run the matrix command
pub async fn run(_args: MatrixArgs) -> Result<()> {
    print!("{}", serde_yaml::to_string(&RunConfig::reference_matrix())?);
    Ok(())
}
