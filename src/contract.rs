//! The `send` contract: stateless business logic driven by FSM requests.
//!
//! Handlers are generic over [`StateClient`] the same way the teacher's
//! `Facilitator` implementations are generic over a provider abstraction —
//! this keeps the balance/fee math unit-testable against an in-memory fake
//! instead of a live socket.

use prost::Message as _;
use std::future::Future;

use crate::codec::{key_for_account, key_for_fee_params, key_for_fee_pool, Address, Amount};
use crate::error::{PluginError, PluginErrorKind};
use crate::proto::{
    Account, AnyMessage, BeginBlockRequest, BeginBlockResponse, CheckTxRequest, CheckTxResponse,
    DeliverTxRequest, DeliverTxResponse, EndBlockRequest, EndBlockResponse, FeeParams,
    GenesisRequest, GenesisResponse, MessageSend, Pool, StateReadResponse, StateWriteResponse,
    MESSAGE_SEND_TYPE_URLS,
};

/// The seam between the contract's business logic and the protocol engine's
/// nested state reads/writes, so tests can supply an in-memory fake instead
/// of a live socket.
pub trait StateClient {
    fn read_state(
        &self,
        fsm_id: u64,
        keys: Vec<(u64, Vec<u8>)>,
    ) -> impl Future<Output = Result<StateReadResponse, PluginError>> + Send;

    fn write_state(
        &self,
        fsm_id: u64,
        sets: Vec<(Vec<u8>, Vec<u8>)>,
        deletes: Vec<Vec<u8>>,
    ) -> impl Future<Output = Result<StateWriteResponse, PluginError>> + Send;
}

fn find_entry<'a>(read: &'a StateReadResponse, query_id: u64, key: &[u8]) -> Option<&'a [u8]> {
    read.results
        .iter()
        .find(|result| result.query_id == query_id)
        .and_then(|result| result.entries.iter().find(|entry| entry.key == key))
        .map(|entry| entry.value.as_slice())
}

fn from_any(any: Option<&AnyMessage>) -> Result<AnyMessage, PluginError> {
    any.cloned()
        .ok_or_else(|| PluginError::with_detail(PluginErrorKind::FromAny, "tx has no message"))
}

fn into_message_send(any: &AnyMessage) -> Result<MessageSend, PluginError> {
    if !MESSAGE_SEND_TYPE_URLS.contains(&any.type_url.as_str()) {
        return Err(PluginError::new(PluginErrorKind::InvalidMessageCast));
    }
    MessageSend::decode(any.value.as_slice())
        .map_err(|e| PluginError::with_detail(PluginErrorKind::FromAny, e.to_string()))
}

/// The plugin-side handler for the `send` transaction type.
pub struct SendContract {
    chain_id: u64,
}

impl SendContract {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub async fn genesis(&self, _req: GenesisRequest) -> GenesisResponse {
        GenesisResponse { error: None }
    }

    pub async fn begin_block(&self, _req: BeginBlockRequest) -> BeginBlockResponse {
        BeginBlockResponse { error: None }
    }

    pub async fn end_block(&self, _req: EndBlockRequest) -> EndBlockResponse {
        EndBlockResponse { error: None }
    }

    pub async fn check_tx(
        &self,
        req: CheckTxRequest,
        fsm_id: u64,
        state: &impl StateClient,
    ) -> CheckTxResponse {
        match self.check_tx_inner(req, fsm_id, state).await {
            Ok(resp) => resp,
            Err(err) => CheckTxResponse {
                recipient: Vec::new(),
                authorized_signers: Vec::new(),
                error: Some(err.into()),
            },
        }
    }

    async fn check_tx_inner(
        &self,
        req: CheckTxRequest,
        fsm_id: u64,
        state: &impl StateClient,
    ) -> Result<CheckTxResponse, PluginError> {
        let params_key = key_for_fee_params();
        let read = state
            .read_state(fsm_id, vec![(1, params_key.clone())])
            .await?;
        let params_bytes = find_entry(&read, 1, &params_key).ok_or_else(|| {
            PluginError::with_detail(PluginErrorKind::Unmarshal, "Fee parameters not found")
        })?;
        let fee_params = FeeParams::decode(params_bytes)
            .map_err(|e| PluginError::with_detail(PluginErrorKind::Unmarshal, e.to_string()))?;

        let tx = req
            .tx
            .ok_or_else(|| PluginError::with_detail(PluginErrorKind::Unmarshal, "missing tx"))?;
        if tx.fee < fee_params.send_fee {
            return Err(PluginError::new(PluginErrorKind::TxFeeBelowStateLimit));
        }

        let any = from_any(tx.msg.as_ref())?;
        let msg = into_message_send(&any)?;

        let from = Address::from_slice(&msg.from_address)?;
        let to = Address::from_slice(&msg.to_address)?;
        Amount::new(msg.amount)?;

        Ok(CheckTxResponse {
            recipient: to.as_bytes().to_vec(),
            authorized_signers: vec![from.as_bytes().to_vec()],
            error: None,
        })
    }

    pub async fn deliver_tx(
        &self,
        req: DeliverTxRequest,
        fsm_id: u64,
        state: &impl StateClient,
    ) -> DeliverTxResponse {
        match self.deliver_tx_inner(req, fsm_id, state).await {
            Ok(()) => DeliverTxResponse { error: None },
            Err(err) => DeliverTxResponse {
                error: Some(err.into()),
            },
        }
    }

    async fn deliver_tx_inner(
        &self,
        req: DeliverTxRequest,
        fsm_id: u64,
        state: &impl StateClient,
    ) -> Result<(), PluginError> {
        let tx = req
            .tx
            .ok_or_else(|| PluginError::with_detail(PluginErrorKind::FromAny, "missing tx"))?;
        let any = from_any(tx.msg.as_ref())?;
        let msg = into_message_send(&any)?;
        self.execute_send(fsm_id, tx.fee, &msg, state).await
    }

    /// Executes a validated send: the balance/fee accounting at the heart
    /// of the contract. See the module docs for the self-transfer carve-out.
    async fn execute_send(
        &self,
        fsm_id: u64,
        fee: u64,
        msg: &MessageSend,
        state: &impl StateClient,
    ) -> Result<(), PluginError> {
        let from = Address::from_slice(&msg.from_address)?;
        let to = Address::from_slice(&msg.to_address)?;
        let amount = Amount::new(msg.amount)?.get();

        let k_from = key_for_account(&from);
        let k_to = key_for_account(&to);
        let k_pool = key_for_fee_pool(self.chain_id);
        let self_transfer = k_from == k_to;

        let read = state
            .read_state(
                fsm_id,
                vec![(1, k_pool.clone()), (2, k_from.clone()), (3, k_to.clone())],
            )
            .await?;

        let from_amount = decode_account_amount(find_entry(&read, 2, &k_from))?;
        let to_amount = decode_account_amount(find_entry(&read, 3, &k_to))?;
        let pool_amount = decode_pool_amount(find_entry(&read, 1, &k_pool))?;

        let deduction = amount
            .checked_add(fee)
            .ok_or_else(|| PluginError::with_detail(PluginErrorKind::Marshal, "amount + fee overflow"))?;
        if from_amount < deduction {
            return Err(PluginError::new(PluginErrorKind::InsufficientFunds));
        }
        let new_from = from_amount - deduction;
        let updated_pool_amount = pool_amount
            .checked_add(fee)
            .ok_or_else(|| PluginError::with_detail(PluginErrorKind::Marshal, "pool overflow"))?;

        let mut sets = vec![(
            k_pool.clone(),
            Pool {
                id: self.chain_id,
                amount: updated_pool_amount,
            }
            .encode_to_vec(),
        )];
        let mut deletes = Vec::new();

        if self_transfer {
            let updated = Account {
                address: to.as_bytes().to_vec(),
                amount: from_amount - fee,
            };
            sets.push((k_from.clone(), updated.encode_to_vec()));
        } else {
            if new_from == 0 {
                deletes.push(k_from.clone());
            } else {
                let updated_from = Account {
                    address: from.as_bytes().to_vec(),
                    amount: new_from,
                };
                sets.push((k_from.clone(), updated_from.encode_to_vec()));
            }
            let updated_to_amount = to_amount
                .checked_add(amount)
                .ok_or_else(|| PluginError::with_detail(PluginErrorKind::Marshal, "recipient overflow"))?;
            let updated_to = Account {
                address: to.as_bytes().to_vec(),
                amount: updated_to_amount,
            };
            sets.push((k_to.clone(), updated_to.encode_to_vec()));
        }

        let write = state.write_state(fsm_id, sets, deletes).await?;
        if let Some(err) = write.error {
            return Err(PluginError::with_detail(PluginErrorKind::Marshal, err.msg));
        }
        Ok(())
    }
}

fn decode_account_amount(entry: Option<&[u8]>) -> Result<u64, PluginError> {
    match entry {
        None => Ok(0),
        Some(bytes) => Account::decode(bytes)
            .map(|acct| acct.amount)
            .map_err(|e| PluginError::with_detail(PluginErrorKind::Unmarshal, e.to_string())),
    }
}

fn decode_pool_amount(entry: Option<&[u8]>) -> Result<u64, PluginError> {
    match entry {
        None => Ok(0),
        Some(bytes) => Pool::decode(bytes)
            .map(|pool| pool.amount)
            .map_err(|e| PluginError::with_detail(PluginErrorKind::Unmarshal, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{StateReadEntry, StateReadResult, StateWriteRequest};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory [`StateClient`] fake that records the last write batch
    /// issued, so tests can assert on it the way spec scenarios do.
    struct FakeState {
        store: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
        read_calls: Mutex<usize>,
        last_write: Mutex<Option<StateWriteRequest>>,
    }

    impl FakeState {
        fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            Self {
                store: Mutex::new(entries.into_iter().collect()),
                read_calls: Mutex::new(0),
                last_write: Mutex::new(None),
            }
        }
    }

    impl StateClient for FakeState {
        fn read_state(
            &self,
            _fsm_id: u64,
            keys: Vec<(u64, Vec<u8>)>,
        ) -> impl Future<Output = Result<StateReadResponse, PluginError>> + Send {
            let store = self.store.lock().unwrap().clone();
            *self.read_calls.lock().unwrap() += 1;
            async move {
                let results = keys
                    .into_iter()
                    .map(|(query_id, key)| {
                        let entries = match store.get(&key) {
                            Some(value) => vec![StateReadEntry {
                                key: key.clone(),
                                value: value.clone(),
                            }],
                            None => Vec::new(),
                        };
                        StateReadResult { query_id, entries }
                    })
                    .collect();
                Ok(StateReadResponse {
                    error: None,
                    results,
                })
            }
        }

        fn write_state(
            &self,
            _fsm_id: u64,
            sets: Vec<(Vec<u8>, Vec<u8>)>,
            deletes: Vec<Vec<u8>>,
        ) -> impl Future<Output = Result<StateWriteResponse, PluginError>> + Send {
            {
                let mut store = self.store.lock().unwrap();
                for (key, value) in &sets {
                    store.insert(key.clone(), value.clone());
                }
                for key in &deletes {
                    store.remove(key);
                }
            }
            *self.last_write.lock().unwrap() = Some(StateWriteRequest {
                sets: sets
                    .into_iter()
                    .map(|(key, value)| crate::proto::StateWriteSet { key, value })
                    .collect(),
                deletes: deletes
                    .into_iter()
                    .map(|key| crate::proto::StateWriteDelete { key })
                    .collect(),
            });
            async { Ok(StateWriteResponse { error: None }) }
        }
    }

    fn addr(byte: u8) -> [u8; 20] {
        [byte; 20]
    }

    fn account_entry(address: [u8; 20], amount: u64) -> (Vec<u8>, Vec<u8>) {
        let key = key_for_account(&Address::from_slice(&address).unwrap());
        let value = Account {
            address: address.to_vec(),
            amount,
        }
        .encode_to_vec();
        (key, value)
    }

    fn pool_entry(chain_id: u64, amount: u64) -> (Vec<u8>, Vec<u8>) {
        (
            key_for_fee_pool(chain_id),
            Pool {
                id: chain_id,
                amount,
            }
            .encode_to_vec(),
        )
    }

    fn fee_params_entry(send_fee: u64) -> (Vec<u8>, Vec<u8>) {
        (key_for_fee_params(), FeeParams { send_fee }.encode_to_vec())
    }

    fn message_send(from: [u8; 20], to: [u8; 20], amount: u64) -> AnyMessage {
        AnyMessage {
            type_url: "types.MessageSend".to_string(),
            value: MessageSend {
                from_address: from.to_vec(),
                to_address: to.to_vec(),
                amount,
            }
            .encode_to_vec(),
        }
    }

    fn deliver_request(fee: u64, msg: AnyMessage) -> DeliverTxRequest {
        DeliverTxRequest {
            tx: Some(crate::proto::TxEnvelope {
                fee,
                msg: Some(msg),
            }),
        }
    }

    #[tokio::test]
    async fn scenario_1_valid_send_both_accounts_present() {
        let state = FakeState::new(vec![
            account_entry(addr(1), 1000),
            account_entry(addr(2), 50),
            pool_entry(1, 0),
        ]);
        let contract = SendContract::new(1);
        let req = deliver_request(2, message_send(addr(1), addr(2), 100));
        let resp = contract.deliver_tx(req, 42, &state).await;
        assert!(resp.error.is_none());

        let write = state.last_write.lock().unwrap().clone().unwrap();
        assert!(write.deletes.is_empty());
        let sets: HashMap<_, _> = write.sets.into_iter().map(|s| (s.key, s.value)).collect();
        assert_eq!(
            sets[&key_for_fee_pool(1)],
            Pool { id: 1, amount: 2 }.encode_to_vec()
        );
        assert_eq!(
            sets[&key_for_account(&Address::from_slice(&addr(1)).unwrap())],
            Account {
                address: addr(1).to_vec(),
                amount: 898
            }
            .encode_to_vec()
        );
        assert_eq!(
            sets[&key_for_account(&Address::from_slice(&addr(2)).unwrap())],
            Account {
                address: addr(2).to_vec(),
                amount: 150
            }
            .encode_to_vec()
        );
    }

    #[tokio::test]
    async fn scenario_2_drain_to_zero_deletes_sender() {
        let state = FakeState::new(vec![
            account_entry(addr(1), 102),
            account_entry(addr(2), 50),
            pool_entry(1, 0),
        ]);
        let contract = SendContract::new(1);
        let req = deliver_request(2, message_send(addr(1), addr(2), 100));
        let resp = contract.deliver_tx(req, 42, &state).await;
        assert!(resp.error.is_none());

        let write = state.last_write.lock().unwrap().clone().unwrap();
        assert_eq!(
            write.deletes,
            vec![crate::proto::StateWriteDelete {
                key: key_for_account(&Address::from_slice(&addr(1)).unwrap())
            }]
        );
        let sets: HashMap<_, _> = write.sets.into_iter().map(|s| (s.key, s.value)).collect();
        assert!(!sets.contains_key(&key_for_account(&Address::from_slice(&addr(1)).unwrap())));
        assert_eq!(
            sets[&key_for_account(&Address::from_slice(&addr(2)).unwrap())],
            Account {
                address: addr(2).to_vec(),
                amount: 150
            }
            .encode_to_vec()
        );
    }

    #[tokio::test]
    async fn scenario_3_self_transfer_only_deducts_fee() {
        let state = FakeState::new(vec![account_entry(addr(1), 500), pool_entry(1, 0)]);
        let contract = SendContract::new(1);
        let req = deliver_request(3, message_send(addr(1), addr(1), 100));
        let resp = contract.deliver_tx(req, 42, &state).await;
        assert!(resp.error.is_none());

        let write = state.last_write.lock().unwrap().clone().unwrap();
        assert!(write.deletes.is_empty());
        assert_eq!(write.sets.len(), 2);
        let sets: HashMap<_, _> = write.sets.into_iter().map(|s| (s.key, s.value)).collect();
        assert_eq!(
            sets[&key_for_fee_pool(1)],
            Pool { id: 1, amount: 3 }.encode_to_vec()
        );
        assert_eq!(
            sets[&key_for_account(&Address::from_slice(&addr(1)).unwrap())],
            Account {
                address: addr(1).to_vec(),
                amount: 497
            }
            .encode_to_vec()
        );
    }

    #[tokio::test]
    async fn scenario_4_insufficient_funds_writes_nothing() {
        let state = FakeState::new(vec![account_entry(addr(1), 10), pool_entry(1, 0)]);
        let contract = SendContract::new(1);
        let req = deliver_request(2, message_send(addr(1), addr(2), 100));
        let resp = contract.deliver_tx(req, 42, &state).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, 9);
        assert_eq!(err.msg, "insufficient funds");
        assert!(state.last_write.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn scenario_5_fee_below_limit_stops_after_one_read() {
        let state = FakeState::new(vec![fee_params_entry(5)]);
        let contract = SendContract::new(1);
        let req = CheckTxRequest {
            tx: Some(crate::proto::TxEnvelope {
                fee: 4,
                msg: Some(message_send(addr(1), addr(2), 100)),
            }),
        };
        let resp = contract.check_tx(req, 42, &state).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, 14);
        assert_eq!(*state.read_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn scenario_6_bad_address_after_fee_check_passes() {
        let state = FakeState::new(vec![fee_params_entry(1)]);
        let contract = SendContract::new(1);
        let req = CheckTxRequest {
            tx: Some(crate::proto::TxEnvelope {
                fee: 2,
                msg: Some(AnyMessage {
                    type_url: "types.MessageSend".to_string(),
                    value: MessageSend {
                        from_address: vec![0u8; 19],
                        to_address: addr(2).to_vec(),
                        amount: 100,
                    }
                    .encode_to_vec(),
                }),
            }),
        };
        let resp = contract.check_tx(req, 42, &state).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, 12);
    }

    #[tokio::test]
    async fn genesis_begin_end_are_no_ops() {
        let state = FakeState::new(vec![]);
        let contract = SendContract::new(1);
        assert!(contract.genesis(GenesisRequest {}).await.error.is_none());
        assert!(contract
            .begin_block(BeginBlockRequest {})
            .await
            .error
            .is_none());
        assert!(contract.end_block(EndBlockRequest {}).await.error.is_none());
        let _ = state;
    }
}
