use crate::types::{Chips, Money, SeatNumber, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Play-fee parameters for the default time-block policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeePolicyConfig {
    pub block_minutes: i64,
    pub fee_per_block: Money,
}

impl Default for FeePolicyConfig {
    fn default() -> Self {
        Self {
            block_minutes: 30,
            fee_per_block: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableConfig {
    pub table_id: TableId,
    pub game_type: String,
    pub rate: String,
    pub min_buy_in: Chips,
    pub max_buy_in: Chips,
    pub seat_count: SeatNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoungeConfig {
    pub fee_policy: FeePolicyConfig,
    /// Bill charge per chip sold over the counter.
    pub chip_unit_price: Money,
    pub tables: Vec<TableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoungeConfigFile {
    #[serde(default)]
    fee_policy: FeePolicyConfig,
    #[serde(default = "default_chip_unit_price")]
    chip_unit_price: Money,
    #[serde(default)]
    tables: Vec<TableConfig>,
}

fn default_chip_unit_price() -> Money {
    1
}

impl LoungeConfig {
    /// Load from the data/ directory.
    /// In tests, use LoungeConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let path = format!("{data_dir}/lounge.json");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: LoungeConfigFile = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;

        let config = Self {
            fee_policy: file.fee_policy,
            chip_unit_price: file.chip_unit_price,
            tables: file.tables,
        };
        config.validate()?;
        log::info!(
            "config: loaded {} tables from {path} (fee {} per {} min)",
            config.tables.len(),
            config.fee_policy.fee_per_block,
            config.fee_policy.block_minutes,
        );
        Ok(config)
    }

    /// Two tables, enough for every test scenario.
    pub fn default_test() -> Self {
        Self {
            fee_policy: FeePolicyConfig::default(),
            chip_unit_price: 1,
            tables: vec![
                TableConfig {
                    table_id: "T1".into(),
                    game_type: "NLH".into(),
                    rate: "1/2".into(),
                    min_buy_in: 100,
                    max_buy_in: 1_000,
                    seat_count: 9,
                },
                TableConfig {
                    table_id: "T2".into(),
                    game_type: "PLO".into(),
                    rate: "2/5".into(),
                    min_buy_in: 300,
                    max_buy_in: 3_000,
                    seat_count: 6,
                },
            ],
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fee_policy.block_minutes <= 0 {
            anyhow::bail!("fee_policy.block_minutes must be positive");
        }
        if self.fee_policy.fee_per_block < 0 {
            anyhow::bail!("fee_policy.fee_per_block must not be negative");
        }
        if self.chip_unit_price < 0 {
            anyhow::bail!("chip_unit_price must not be negative");
        }
        let mut seen = HashSet::new();
        for t in &self.tables {
            if !seen.insert(t.table_id.as_str()) {
                anyhow::bail!("duplicate table id {}", t.table_id);
            }
            if t.seat_count <= 0 {
                anyhow::bail!("table {} must have at least one seat", t.table_id);
            }
            if t.min_buy_in < 0 || t.min_buy_in > t.max_buy_in {
                anyhow::bail!("table {} has an invalid buy-in range", t.table_id);
            }
        }
        Ok(())
    }
}
