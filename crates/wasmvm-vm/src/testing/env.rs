use wasmvm_types::{BlockInfo, Coin, ContractInfo, Env, MessageInfo, TransactionInfo};

pub const MOCK_CONTRACT_ADDR: &str = "contract";

/// Environment of a contract at address [`MOCK_CONTRACT_ADDR`].
pub fn mock_env() -> Env {
    Env {
        block: BlockInfo {
            height: 12_345,
            time: 1_571_797_419_879_305_533,
            chain_id: "cosmos-testnet-14002".to_string(),
        },
        transaction: Some(TransactionInfo { index: 3 }),
        contract: ContractInfo {
            address: MOCK_CONTRACT_ADDR.to_string(),
        },
    }
}

pub fn mock_info(sender: &str, funds: &[Coin]) -> MessageInfo {
    MessageInfo {
        sender: sender.to_string(),
        funds: funds.to_vec(),
    }
}
