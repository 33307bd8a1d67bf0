use std::sync::Arc;

use crate::{
    backend::Backend,
    config::Config,
    pallet::{Adjudicator, Depositor, Funder, Pallet},
    substrate::{self, Api, ChainClient},
    wallet::Account,
};

/// The main object to fund and settle Perun channels on a substrate chain.
///
/// It owns the connection to the chain and hands out funders and
/// adjudicators for on-chain accounts. Usually you only need one
/// PerunClient per chain.
#[derive(Debug, Clone)]
pub struct PerunClient {
    pallet: Pallet,
    backend: Backend,
}

impl PerunClient {
    /// Connects to the chain behind `client`, fetching its metadata once.
    pub async fn connect(
        client: Arc<dyn ChainClient>,
        config: Config,
    ) -> Result<Self, substrate::Error> {
        let api = Arc::new(Api::connect(client).await?);
        Ok(Self::new(api, config))
    }

    pub fn new(api: Arc<Api>, config: Config) -> Self {
        PerunClient {
            pallet: Pallet::new(api, config),
            backend: Backend,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn pallet(&self) -> &Pallet {
        &self.pallet
    }

    /// Funder that deposits from `on_chain`.
    pub fn funder(&self, on_chain: Arc<dyn Account>) -> Funder {
        Funder::new(self.pallet.clone(), on_chain)
    }

    pub fn depositor(&self) -> Depositor {
        Depositor::new(self.pallet.clone())
    }

    /// Adjudicator that pays its extrinsics from `on_chain` and withdraws
    /// to it.
    pub fn adjudicator(&self, on_chain: Arc<dyn Account>) -> Adjudicator {
        Adjudicator::new(self.pallet.clone(), on_chain)
    }
}
