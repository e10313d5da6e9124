//! 远程调用接口
//!
//! `ChainClient` 负责只读调用，`TxSigner` 负责签名和发送。两者都按节点调用，
//! 由故障转移执行器决定用哪个节点；测试时注入替身实现。

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use models::Endpoint;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use ::utils::StatsHttp;

use crate::endpoint_pool::EndpointPool;
use crate::error_classifier::{classify_message, classify_provider_error};
use crate::types::RpcError;

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn estimate_gas(&self, endpoint: &Endpoint, tx: &TypedTransaction) -> Result<U256, RpcError>;

    async fn gas_price(&self, endpoint: &Endpoint) -> Result<U256, RpcError>;

    async fn transaction_receipt(
        &self,
        endpoint: &Endpoint,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, RpcError>;

    async fn block_number(&self, endpoint: &Endpoint) -> Result<u64, RpcError>;
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    /// 是否有可用的连接
    fn is_connected(&self) -> bool;

    /// 通过指定节点签名并发送，返回交易哈希
    async fn send_transaction(&self, endpoint: &Endpoint, tx: TypedTransaction) -> Result<H256, RpcError>;
}

/// 基于 HTTP 的只读客户端，每个节点一个 Provider
pub struct HttpChainClient {
    providers: HashMap<String, Arc<Provider<StatsHttp>>>,
}

impl HttpChainClient {
    pub fn new(pool: &EndpointPool) -> Result<Self, RpcError> {
        let providers = pool
            .all()
            .iter()
            .map(|endpoint| {
                let transport = StatsHttp::new(&endpoint.url)
                    .map_err(|e| RpcError::Config(format!("{}: {}", endpoint, e)))?;
                Ok((endpoint.url.clone(), Arc::new(Provider::new(transport))))
            })
            .collect::<Result<HashMap<_, _>, RpcError>>()?;

        Ok(Self { providers })
    }

    fn provider(&self, endpoint: &Endpoint) -> Result<&Arc<Provider<StatsHttp>>, RpcError> {
        self.providers
            .get(&endpoint.url)
            .ok_or_else(|| RpcError::Config(format!("unknown endpoint {}", endpoint)))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn estimate_gas(&self, endpoint: &Endpoint, tx: &TypedTransaction) -> Result<U256, RpcError> {
        self.provider(endpoint)?
            .estimate_gas(tx, None)
            .await
            .map_err(|e| classify_provider_error(&e))
    }

    async fn gas_price(&self, endpoint: &Endpoint) -> Result<U256, RpcError> {
        self.provider(endpoint)?
            .get_gas_price()
            .await
            .map_err(|e| classify_provider_error(&e))
    }

    async fn transaction_receipt(
        &self,
        endpoint: &Endpoint,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, RpcError> {
        self.provider(endpoint)?
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| classify_provider_error(&e))
    }

    async fn block_number(&self, endpoint: &Endpoint) -> Result<u64, RpcError> {
        self.provider(endpoint)?
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| classify_provider_error(&e))
    }
}

type SignerClient = SignerMiddleware<Provider<StatsHttp>, LocalWallet>;

/// 本地私钥签名器，每个节点绑定一个 SignerMiddleware
pub struct LocalSigner {
    address: Address,
    clients: HashMap<String, Arc<SignerClient>>,
}

impl LocalSigner {
    pub fn new(private_key: &str, chain_id: u64, client: &HttpChainClient) -> Result<Self, RpcError> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| RpcError::Config(format!("invalid private key: {}", e)))?
            .with_chain_id(chain_id);
        let address = wallet.address();

        let clients = client
            .providers
            .iter()
            .map(|(url, provider)| {
                (url.clone(), Arc::new(SignerMiddleware::new(provider.as_ref().clone(), wallet.clone())))
            })
            .collect();

        info!("签名器已绑定: {:?}", address);
        Ok(Self { address, clients })
    }
}

#[async_trait]
impl TxSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn is_connected(&self) -> bool {
        !self.clients.is_empty()
    }

    async fn send_transaction(&self, endpoint: &Endpoint, tx: TypedTransaction) -> Result<H256, RpcError> {
        let client = self
            .clients
            .get(&endpoint.url)
            .ok_or(RpcError::NotConnected)?;

        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_message(e.to_string()))?;

        Ok(pending.tx_hash())
    }
}
