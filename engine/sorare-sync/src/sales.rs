//! Sale records and the sales-history sheet layout

use crate::client::at;
use crate::models::{
    number, parse_number, PLAYER_NAME_COLUMN, PLAYER_SLUG_COLUMN, SHEET_TIME_FORMAT,
};
use crate::sheet::Record;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use sync_core::Keyed;

/// Windows, in days, of the average-price columns
pub const AVERAGE_PERIODS: [i64; 4] = [3, 7, 14, 30];

pub const RARITY_SEARCHED_COLUMN: &str = "Rarity Searched";

/// Whether the sold card was eligible for in-season competitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeasonEligibility {
    InSeason,
    Classic,
}

impl SeasonEligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeasonEligibility::InSeason => "IN_SEASON",
            SeasonEligibility::Classic => "CLASSIC",
        }
    }

    /// Parse a sheet cell; anything but `IN_SEASON` counts as classic
    pub fn from_cell(cell: &str) -> Self {
        if cell.trim().eq_ignore_ascii_case("IN_SEASON") {
            SeasonEligibility::InSeason
        } else {
            SeasonEligibility::Classic
        }
    }
}

impl fmt::Display for SeasonEligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub timestamp_ms: i64,
    pub price_eur: f64,
    pub eligibility: SeasonEligibility,
}

impl Keyed for SaleRecord {
    type Key = i64;

    fn key(&self) -> i64 {
        self.timestamp_ms
    }
}

impl SaleRecord {
    /// Decode one `tokenPrices` entry
    ///
    /// The timestamp is truncated to whole seconds, the precision the sheet
    /// stores, so a sale read back from a row keeps the same key.
    pub fn from_token_price(node: &Value) -> Option<Self> {
        let date = at(node, &["date"])?.as_str()?;
        let timestamp = DateTime::parse_from_rfc3339(date).ok()?;
        let cents = at(node, &["amounts", "eurCents"])?.as_f64()?;
        let in_season =
            at(node, &["card", "inSeasonEligible"]).and_then(Value::as_bool).unwrap_or(false);

        Some(Self {
            timestamp_ms: timestamp.timestamp() * 1000,
            price_eur: cents / 100.0,
            eligibility: if in_season {
                SeasonEligibility::InSeason
            } else {
                SeasonEligibility::Classic
            },
        })
    }

    /// Sale time in UTC
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp_ms).single()
    }
}

/// Header row of the sales-history sheet retaining up to `max_sales` sales
pub fn sales_sheet_headers(max_sales: usize) -> Vec<String> {
    let mut headers = vec![
        PLAYER_NAME_COLUMN.to_string(),
        PLAYER_SLUG_COLUMN.to_string(),
        RARITY_SEARCHED_COLUMN.to_string(),
        "Sales Today (In-Season)".to_string(),
        "Sales Today (Classic)".to_string(),
    ];
    for period in AVERAGE_PERIODS {
        headers.push(format!("Avg Price {period}d (In-Season)"));
        headers.push(format!("Avg Price {period}d (Classic)"));
    }
    for j in 1..=max_sales {
        headers.push(sale_date_column(j));
        headers.push(sale_price_column(j));
        headers.push(sale_eligibility_column(j));
    }
    headers.push("Last Updated".to_string());
    headers
}

fn sale_date_column(j: usize) -> String {
    format!("Sale {j} Date")
}

fn sale_price_column(j: usize) -> String {
    format!("Sale {j} Price (EUR)")
}

fn sale_eligibility_column(j: usize) -> String {
    format!("Sale {j} Eligibility")
}

/// One row of the sales-history sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SalesHistoryRow {
    pub player_name: String,
    pub player_slug: String,
    pub rarity: String,
    /// Most recent first
    pub sales: Vec<SaleRecord>,
    pub last_updated: DateTime<Utc>,
}

impl SalesHistoryRow {
    /// Number of sales of one eligibility on the calendar day of `now`
    pub fn sales_today(&self, eligibility: SeasonEligibility) -> usize {
        let today = self.last_updated.date_naive();
        self.sales
            .iter()
            .filter(|s| s.eligibility == eligibility)
            .filter(|s| s.time().map(|t| t.date_naive() == today).unwrap_or(false))
            .count()
    }

    /// Mean price of one eligibility over the last `days` days
    pub fn average_price(&self, days: i64, eligibility: SeasonEligibility) -> Option<f64> {
        let since = (self.last_updated - Duration::days(days)).timestamp_millis();
        let prices: Vec<f64> = self
            .sales
            .iter()
            .filter(|s| s.eligibility == eligibility && s.timestamp_ms >= since)
            .map(|s| s.price_eur)
            .collect();

        if prices.is_empty() {
            return None;
        }
        Some(prices.iter().sum::<f64>() / prices.len() as f64)
    }

    /// Cells in [`sales_sheet_headers`] order
    pub fn to_row(&self, max_sales: usize) -> Vec<String> {
        let mut row = vec![
            self.player_name.clone(),
            self.player_slug.clone(),
            self.rarity.clone(),
            self.sales_today(SeasonEligibility::InSeason).to_string(),
            self.sales_today(SeasonEligibility::Classic).to_string(),
        ];

        for period in AVERAGE_PERIODS {
            for eligibility in [SeasonEligibility::InSeason, SeasonEligibility::Classic] {
                row.push(self.average_price(period, eligibility).map(number).unwrap_or_default());
            }
        }

        for j in 0..max_sales {
            match self.sales.get(j) {
                Some(sale) => {
                    row.push(
                        sale.time()
                            .map(|t| t.format(SHEET_TIME_FORMAT).to_string())
                            .unwrap_or_default(),
                    );
                    row.push(number(sale.price_eur));
                    row.push(sale.eligibility.to_string());
                }
                None => row.extend([String::new(), String::new(), String::new()]),
            }
        }

        row.push(self.last_updated.format(SHEET_TIME_FORMAT).to_string());
        row
    }
}

/// Sales stored in an existing sheet row; malformed entries are skipped
pub fn sales_from_record(record: &Record, max_sales: usize) -> Vec<SaleRecord> {
    let cell = |name: String| record.get(&name).map(String::as_str).unwrap_or_default();

    (1..=max_sales)
        .filter_map(|j| {
            let date = cell(sale_date_column(j));
            let price = parse_number(cell(sale_price_column(j)))?;
            let time = NaiveDateTime::parse_from_str(date.trim(), SHEET_TIME_FORMAT).ok()?;

            Some(SaleRecord {
                timestamp_ms: time.and_utc().timestamp_millis(),
                price_eur: price,
                eligibility: SeasonEligibility::from_cell(cell(sale_eligibility_column(j))),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at_time(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn sale(time: &str, price: f64, eligibility: SeasonEligibility) -> SaleRecord {
        SaleRecord { timestamp_ms: at_time(time).timestamp_millis(), price_eur: price, eligibility }
    }

    #[test]
    fn test_headers_layout() {
        let headers = sales_sheet_headers(2);
        assert_eq!(headers.len(), 5 + 8 + 6 + 1);
        assert_eq!(headers[5], "Avg Price 3d (In-Season)");
        assert_eq!(headers[12], "Avg Price 30d (Classic)");
        assert_eq!(headers[13], "Sale 1 Date");
        assert_eq!(headers[18], "Sale 2 Eligibility");
        assert_eq!(headers[19], "Last Updated");
    }

    #[test]
    fn test_token_price_parsing() {
        let node = json!({
            "amounts": { "eurCents": 1250 },
            "date": "2024-02-18T08:15:00Z",
            "card": { "inSeasonEligible": true }
        });
        let parsed = SaleRecord::from_token_price(&node).unwrap();
        assert_eq!(parsed.price_eur, 12.5);
        assert_eq!(parsed.eligibility, SeasonEligibility::InSeason);
        assert_eq!(parsed.timestamp_ms, at_time("2024-02-18T08:15:00Z").timestamp_millis());

        assert!(SaleRecord::from_token_price(&json!({ "date": "yesterday" })).is_none());
    }

    #[test]
    fn test_row_statistics() {
        let row = SalesHistoryRow {
            player_name: "Pedri".to_string(),
            player_slug: "pedro-gonzalez-lopez".to_string(),
            rarity: "limited".to_string(),
            sales: vec![
                sale("2024-02-18T08:00:00Z", 10.0, SeasonEligibility::InSeason),
                sale("2024-02-18T07:00:00Z", 20.0, SeasonEligibility::InSeason),
                sale("2024-02-16T07:00:00Z", 5.0, SeasonEligibility::Classic),
                sale("2024-02-01T07:00:00Z", 30.0, SeasonEligibility::InSeason),
            ],
            last_updated: at_time("2024-02-18T12:00:00Z"),
        };

        assert_eq!(row.sales_today(SeasonEligibility::InSeason), 2);
        assert_eq!(row.sales_today(SeasonEligibility::Classic), 0);
        assert_eq!(row.average_price(3, SeasonEligibility::InSeason), Some(15.0));
        assert_eq!(row.average_price(3, SeasonEligibility::Classic), Some(5.0));
        assert_eq!(row.average_price(30, SeasonEligibility::InSeason), Some(20.0));
        assert_eq!(row.average_price(7, SeasonEligibility::Classic), Some(5.0));

        let cells = row.to_row(5);
        assert_eq!(cells.len(), sales_sheet_headers(5).len());
        assert_eq!(cells[3], "2");
        assert_eq!(cells[5], "15");
        assert_eq!(cells[13], "2024-02-18 08:00:00");
        assert_eq!(cells[14], "10");
        assert_eq!(cells[15], "IN_SEASON");
        assert_eq!(cells[25], "");
    }

    #[test]
    fn test_sales_survive_sheet_roundtrip() {
        let headers = sales_sheet_headers(3);
        let row = SalesHistoryRow {
            player_name: "Gavi".to_string(),
            player_slug: "pablo-martin-paez-gavira".to_string(),
            rarity: "rare".to_string(),
            sales: vec![
                sale("2024-02-10T10:00:00Z", 99.9, SeasonEligibility::Classic),
                sale("2024-02-09T10:00:00Z", 101.0, SeasonEligibility::InSeason),
            ],
            last_updated: at_time("2024-02-18T12:00:00Z"),
        };

        let record: Record = headers.into_iter().zip(row.to_row(3)).collect();
        assert_eq!(sales_from_record(&record, 3), row.sales);
    }

    #[test]
    fn test_fractional_second_sale_not_duplicated_after_roundtrip() {
        let node = json!({
            "amounts": { "eurCents": 700 },
            "date": "2024-02-18T08:15:00.500Z",
            "card": { "inSeasonEligible": false }
        });
        let fresh = SaleRecord::from_token_price(&node).unwrap();
        assert_eq!(fresh.timestamp_ms, at_time("2024-02-18T08:15:00Z").timestamp_millis());

        let row = SalesHistoryRow {
            player_name: "Pedri".to_string(),
            player_slug: "pedro-gonzalez-lopez".to_string(),
            rarity: "limited".to_string(),
            sales: vec![fresh.clone()],
            last_updated: at_time("2024-02-18T12:00:00Z"),
        };
        let record: Record = sales_sheet_headers(5).into_iter().zip(row.to_row(5)).collect();
        let stored = sales_from_record(&record, 5);

        let merged = sync_core::merge_by_key(stored, vec![fresh], 100);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_malformed_sheet_sales_skipped() {
        let mut record = Record::new();
        record.insert("Sale 1 Date".to_string(), "not a date".to_string());
        record.insert("Sale 1 Price (EUR)".to_string(), "12".to_string());
        record.insert("Sale 2 Date".to_string(), "2024-01-01 10:00:00".to_string());
        record.insert("Sale 2 Price (EUR)".to_string(), "".to_string());
        record.insert("Sale 3 Date".to_string(), "2024-01-02 10:00:00".to_string());
        record.insert("Sale 3 Price (EUR)".to_string(), "7,5".to_string());

        let sales = sales_from_record(&record, 3);
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].price_eur, 7.5);
        assert_eq!(sales[0].eligibility, SeasonEligibility::Classic);
    }
}
