use std::sync::Arc;

use burrow_storage::Store;

use crate::generator::Generator;
use crate::identity::CookieSigner;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    generator: Arc<dyn Generator>,
    signer: CookieSigner,
    base_url: String,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        generator: impl Generator,
        signer: CookieSigner,
        public_base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = public_base_url.into();
        Self {
            store,
            generator: Arc::new(generator),
            signer,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    pub fn next_id(&self) -> String {
        self.generator.generate()
    }

    /// The public URL that redirects to the link `id`.
    pub fn short_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::SeqGenerator;

    #[test]
    fn short_url_joins_base_and_id() {
        let state = AppState::new(
            Arc::new(Store::in_memory()),
            SeqGenerator::with_prefix("t"),
            CookieSigner::new(b"secret").unwrap(),
            "http://localhost:8080/",
        );

        assert_eq!(state.short_url("abc"), "http://localhost:8080/abc");
        assert_eq!(state.next_id(), "t000000");
    }
}
