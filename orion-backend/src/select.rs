//! Backend selection.

use std::sync::Arc;

use orion_config::{BackendKind, OrionConfig};

use crate::client::BackendClient;
use crate::error::BackendError;
use crate::nanodlp::NanoDlpClient;
use crate::odyssey::OdysseyClient;
use crate::simulated::SimulatedBackend;

/// Choose the concrete backend adapter for a configuration snapshot.
/// The developer `simulated` override wins over the backend flavor.
pub fn select_backend(
    config: &OrionConfig,
) -> Result<Arc<dyn BackendClient>, BackendError> {
    if config.developer.simulated {
        log::info!("[Backend] developer override: using simulated backend");
        return Ok(Arc::new(SimulatedBackend::new()));
    }
    let client: Arc<dyn BackendClient> = match config.backend {
        BackendKind::Nanodlp => Arc::new(NanoDlpClient::new(config)?),
        BackendKind::Odyssey => Arc::new(OdysseyClient::new(config)?),
    };
    log::info!(
        "[Backend] using {} backend at {}",
        client.kind(),
        config.base_url
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: BackendKind, simulated: bool) -> OrionConfig {
        let mut config = OrionConfig::default();
        config.backend = kind;
        config.base_url = "http://127.0.0.1:1".to_string();
        config.developer.simulated = simulated;
        config
    }

    #[test]
    fn flavor_selects_the_matching_adapter() {
        let odyssey =
            select_backend(&config(BackendKind::Odyssey, false)).unwrap();
        assert_eq!(odyssey.kind(), "odyssey");

        let nanodlp =
            select_backend(&config(BackendKind::Nanodlp, false)).unwrap();
        assert_eq!(nanodlp.kind(), "nanodlp");
    }

    #[test]
    fn simulated_override_wins() {
        let simulated =
            select_backend(&config(BackendKind::Nanodlp, true)).unwrap();
        assert_eq!(simulated.kind(), "simulated");
    }
}
