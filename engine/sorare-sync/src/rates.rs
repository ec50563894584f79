//! Currency conversion of live offer prices into EUR

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const ETH_RATE_URL: &str = "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=eur";
const FIAT_RATES_URL: &str = "https://api.exchangerate-api.com/v4/latest/EUR";
const RATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Conversion factors into EUR
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRates {
    pub eth_to_eur: f64,
    pub usd_to_eur: f64,
    pub gbp_to_eur: f64,
}

impl Default for CurrencyRates {
    fn default() -> Self {
        Self { eth_to_eur: 3000.0, usd_to_eur: 0.92, gbp_to_eur: 1.17 }
    }
}

impl CurrencyRates {
    /// Fetch current rates, keeping the fallback value for any lookup that fails
    pub async fn fetch() -> Self {
        let mut rates = Self::default();

        let client = match Client::builder().timeout(RATE_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to create HTTP client for rates, using fallbacks: {}", e);
                return rates;
            }
        };

        match fetch_json(&client, ETH_RATE_URL).await {
            Ok(body) => match body["ethereum"]["eur"].as_f64() {
                Some(rate) if rate > 0.0 => rates.eth_to_eur = rate,
                _ => warn!("ETH rate missing from response, using {}", rates.eth_to_eur),
            },
            Err(e) => warn!("ETH rate lookup failed, using {}: {:#}", rates.eth_to_eur, e),
        }

        match fetch_json(&client, FIAT_RATES_URL).await {
            Ok(body) => {
                let fiat = &body["rates"];
                if let Some(usd) = fiat["USD"].as_f64().filter(|r| *r > 0.0) {
                    rates.usd_to_eur = 1.0 / usd;
                }
                if let Some(gbp) = fiat["GBP"].as_f64().filter(|r| *r > 0.0) {
                    rates.gbp_to_eur = 1.0 / gbp;
                }
            }
            Err(e) => warn!("Fiat rate lookup failed, using fallbacks: {:#}", e),
        }

        info!(
            "Currency rates: ETH/EUR {:.2}, USD/EUR {:.4}, GBP/EUR {:.4}",
            rates.eth_to_eur, rates.usd_to_eur, rates.gbp_to_eur
        );
        rates
    }

    /// EUR value of a node carrying a `liveSingleSaleOffer`, rounded to cents
    pub fn eur_price(&self, node: &Value) -> Option<f64> {
        let amounts = &node["liveSingleSaleOffer"]["receiverSide"]["amounts"];
        let amounts = match amounts {
            Value::Array(list) => list.first()?,
            Value::Object(_) => amounts,
            _ => return None,
        };

        let cents = |field: &str| amounts[field].as_f64().map(|c| c / 100.0);

        let currency = amounts["referenceCurrency"].as_str().unwrap_or_default().to_lowercase();
        let euros = match currency.as_str() {
            "eur" => cents("eurCents")?,
            "usd" => cents("usdCents")? * self.usd_to_eur,
            "gbp" => cents("gbpCents")? * self.gbp_to_eur,
            "eth" | "wei" => wei_to_eth(&amounts["wei"])? * self.eth_to_eur,
            _ => return None,
        };

        (euros > 0.0).then(|| (euros * 100.0).round() / 100.0)
    }
}

fn wei_to_eth(value: &Value) -> Option<f64> {
    let wei = match value {
        Value::String(s) => s.parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    Some(wei / 1e18)
}

async fn fetch_json(client: &Client, url: &str) -> anyhow::Result<Value> {
    let response = client.get(url).send().await.context("request failed")?;

    if !response.status().is_success() {
        anyhow::bail!("status {}", response.status());
    }

    response.json().await.context("invalid JSON")
}
