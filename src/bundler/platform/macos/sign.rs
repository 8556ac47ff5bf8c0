//! Bundle signature.

use super::{AppBundle, fixup};
use crate::bundler::{
    error::{Error, Result},
    settings::SigningSettings,
    utils::process::ToolCommand,
};

/// Signs `bundle` with `codesign --deep`, covering every architecture.
///
/// Refuses to run while the bundle still has layout violations; the signer
/// would reject them anyway, with a far less useful message.
pub async fn sign(bundle: &AppBundle, signing: &SigningSettings) -> Result<()> {
    let violations = fixup::scan(bundle).await?;
    if !violations.is_empty() {
        return Err(Error::StructuralViolation {
            bundle: bundle.root().to_path_buf(),
            unresolved: violations.iter().map(ToString::to_string).collect(),
        });
    }

    let identity = if signing.identity == "-" {
        "ad-hoc".to_string()
    } else {
        format!("`{}`", signing.identity)
    };
    log::info!("Signing {} ({})", bundle.root().display(), identity);

    ToolCommand::from_argv(&signing.command)?
        .args(["-s", signing.identity.as_str()])
        .args(["--force", "--all-architectures", "--timestamp", "--deep"])
        .arg(bundle.root())
        .run()
        .await?;

    log::info!("✓ Signed {}", bundle.root().display());
    Ok(())
}
