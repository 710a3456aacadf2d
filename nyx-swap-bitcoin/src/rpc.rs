//! Bitcoin Core RPC implementation of the node bridge.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::{Address, Amount, Txid};
use bitcoincore_rpc::json::{AddressType, CreateRawTransactionInput, FundRawTransactionOptions};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use tracing::{debug, warn};

use crate::bridge::{BridgeError, BridgeTxIn, NodeBridge, Result, TxOutInfo};
use crate::settings::Network;

/// Connection parameters for a Bitcoin Core node.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// RPC endpoint URL.
    pub url: String,
    /// RPC username (optional).
    pub user: Option<String>,
    /// RPC password (optional).
    pub password: Option<String>,
    /// Wallet name, for multi-wallet nodes.
    pub wallet: Option<String>,
    /// Network the node is expected to be on.
    pub network: Network,
}

impl RpcConfig {
    /// Create a config for an endpoint and network.
    pub fn new(url: impl Into<String>, network: Network) -> Self {
        Self {
            url: url.into(),
            user: None,
            password: None,
            wallet: None,
            network,
        }
    }

    /// Set RPC authentication.
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Set the wallet name.
    pub fn with_wallet(mut self, wallet: impl Into<String>) -> Self {
        self.wallet = Some(wallet.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(BridgeError::Other("RPC URL is required".into()));
        }
        Ok(())
    }
}

/// Node bridge backed by Bitcoin Core's JSON-RPC interface.
pub struct CoreRpcBridge {
    client: Client,
    network: bitcoin::Network,
}

impl CoreRpcBridge {
    /// Connect to the node and verify it is on the configured chain.
    pub fn connect(config: RpcConfig) -> Result<Self> {
        config.validate()?;

        let auth = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Auth::UserPass(user.clone(), password.clone()),
            _ => Auth::None,
        };

        let url = if let Some(ref wallet) = config.wallet {
            format!("{}/wallet/{}", config.url, wallet)
        } else {
            config.url.clone()
        };

        let client = Client::new(&url, auth).map_err(|e| BridgeError::Io(e.to_string()))?;

        let bridge = Self {
            client,
            network: config.network.to_bitcoin_network(),
        };
        bridge.check_chain()?;
        Ok(bridge)
    }

    /// Verify the node's chain matches the configured network.
    fn check_chain(&self) -> Result<()> {
        let info = self.client.get_blockchain_info().map_err(map_rpc_error)?;
        if info.chain != self.network {
            warn!(
                expected = %self.network,
                got = %info.chain,
                "node is on the wrong chain"
            );
            return Err(BridgeError::InvalidGenesisBlock {
                expected: self.network.to_string(),
                got: info.chain.to_string(),
            });
        }
        Ok(())
    }

    fn parse_address(&self, address: &str) -> Result<Address> {
        Address::from_str(address)
            .map_err(|e| BridgeError::InvalidResultFormat(format!("address: {}", e)))?
            .require_network(self.network)
            .map_err(|e| BridgeError::InvalidResultFormat(format!("address network: {}", e)))
    }

    fn parse_txid(txid: &str) -> Result<Txid> {
        Txid::from_str(txid).map_err(|e| BridgeError::InvalidResultFormat(format!("txid: {}", e)))
    }
}

/// Translate a `bitcoincore-rpc` failure into the bridge vocabulary.
fn map_rpc_error(error: bitcoincore_rpc::Error) -> BridgeError {
    use bitcoincore_rpc::jsonrpc::Error as JsonRpc;

    match error {
        bitcoincore_rpc::Error::JsonRpc(JsonRpc::Rpc(rpc)) => {
            // -4: wallet-level failure, -6: not enough funds.
            if rpc.code == -4 || rpc.code == -6 {
                BridgeError::InsufficientFunds(rpc.message)
            } else {
                BridgeError::Other(format!("rpc error {}: {}", rpc.code, rpc.message))
            }
        }
        bitcoincore_rpc::Error::JsonRpc(JsonRpc::Transport(transport)) => {
            let text = transport.to_string();
            if text.contains("401") || text.contains("Unauthorized") {
                BridgeError::InvalidCredentials(text)
            } else {
                BridgeError::Io(text)
            }
        }
        bitcoincore_rpc::Error::JsonRpc(JsonRpc::Json(json)) => {
            BridgeError::InvalidResultFormat(json.to_string())
        }
        bitcoincore_rpc::Error::JsonRpc(other) => BridgeError::Io(other.to_string()),
        other => BridgeError::Other(other.to_string()),
    }
}

#[async_trait]
impl NodeBridge for CoreRpcBridge {
    async fn get_raw_change_address(&self) -> Result<String> {
        // Legacy addresses keep the swap key spendable by the P2SH legs.
        let address = self
            .client
            .get_raw_change_address(Some(AddressType::Legacy))
            .map_err(map_rpc_error)?
            .require_network(self.network)
            .map_err(|e| BridgeError::InvalidResultFormat(format!("address network: {}", e)))?;
        Ok(address.to_string())
    }

    async fn fund_raw_transaction(&self, tx_hex: &str, fee_rate: u64) -> Result<(String, i32)> {
        let options = FundRawTransactionOptions {
            fee_rate: Some(Amount::from_sat(fee_rate)),
            ..Default::default()
        };
        let funded = self
            .client
            .fund_raw_transaction(tx_hex, Some(&options), None)
            .map_err(map_rpc_error)?;
        debug!(fee = funded.fee.to_sat(), "funded raw transaction");
        Ok((hex::encode(funded.hex), funded.change_position))
    }

    async fn sign_raw_transaction(&self, tx_hex: &str) -> Result<(String, bool)> {
        let signed = self
            .client
            .sign_raw_transaction_with_wallet(tx_hex, None, None)
            .map_err(map_rpc_error)?;
        Ok((hex::encode(signed.hex), signed.complete))
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String> {
        let txid = self
            .client
            .send_raw_transaction(tx_hex)
            .map_err(map_rpc_error)?;
        Ok(txid.to_string())
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[BridgeTxIn],
        outputs: &[(String, u64)],
        locktime: u64,
    ) -> Result<String> {
        let utxos: Vec<CreateRawTransactionInput> = inputs
            .iter()
            .map(|input| {
                Ok(CreateRawTransactionInput {
                    txid: Self::parse_txid(&input.txid)?,
                    vout: input.vout,
                    sequence: None,
                })
            })
            .collect::<Result<_>>()?;

        let outs: HashMap<String, Amount> = outputs
            .iter()
            .map(|(address, value)| (address.clone(), Amount::from_sat(*value)))
            .collect();

        self.client
            .create_raw_transaction_hex(&utxos, &outs, Some(locktime as i64), None)
            .map_err(map_rpc_error)
    }

    async fn dump_private_key(&self, address: &str) -> Result<String> {
        let address = self.parse_address(address)?;
        let key = self
            .client
            .dump_private_key(&address)
            .map_err(map_rpc_error)?;
        Ok(key.to_wif())
    }

    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<TxOutInfo>> {
        let txid = Self::parse_txid(txid)?;
        let result = self
            .client
            .get_tx_out(&txid, vout, Some(true))
            .map_err(map_rpc_error)?;

        Ok(result.map(|out| TxOutInfo {
            script_pubkey: hex::encode(out.script_pub_key.hex),
            value: out.value.to_sat(),
            confirmations: out.confirmations as u64,
        }))
    }

    async fn get_block_count(&self) -> Result<u64> {
        self.client.get_block_count().map_err(map_rpc_error)
    }
}
