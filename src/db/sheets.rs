use crate::db::sheets_auth::{fetch_access_token, ServiceAccountKey};
use crate::db::store::{History, SnapshotStore};
use crate::error::StoreError;
use crate::model::snapshot::{ColumnIndex, VideoSnapshot, HISTORY_COLUMNS};
use crate::service::export_service::ExportRow;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use url::Url;

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Snapshot history kept in a Google Sheets worksheet, one row per snapshot
/// below a header row.
pub struct SheetsStore {
    http: Client,
    key: ServiceAccountKey,
    spreadsheet_id: String,
    history_sheet: String,
    current_sheet: String,
    token: OnceCell<String>,
    history_ready: OnceCell<()>,
}

impl SheetsStore {
    pub fn new(
        http: Client,
        key: ServiceAccountKey,
        spreadsheet_id: &str,
        history_sheet: &str,
        current_sheet: &str,
    ) -> Self {
        SheetsStore {
            http,
            key,
            spreadsheet_id: spreadsheet_id.to_string(),
            history_sheet: history_sheet.to_string(),
            current_sheet: current_sheet.to_string(),
            token: OnceCell::new(),
            history_ready: OnceCell::new(),
        }
    }

    async fn token(&self) -> Result<&str, StoreError> {
        let token = self
            .token
            .get_or_try_init(|| fetch_access_token(&self.http, &self.key))
            .await?;
        Ok(token.as_str())
    }

    async fn call(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        self.call_on(&self.spreadsheet_id, method, segments, query, body)
            .await
    }

    /// `resource` is the spreadsheet id, optionally suffixed with a custom method.
    async fn call_on(
        &self,
        resource: &str,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value, StoreError> {
        let url = sheets_url(resource, segments, query)?;
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(self.token().await?);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let err = StoreError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            };
            tracing::error!("{}", err);
            return Err(err);
        }

        Ok(response.json::<Value>().await?)
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, StoreError> {
        let json = self
            .call(Method::GET, &[], &[("fields", "sheets.properties.title")], None)
            .await?;

        Ok(json["sheets"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|sheet| sheet["properties"]["title"].as_str())
            .map(|title| title.to_string())
            .collect())
    }

    async fn ensure_sheet(&self, title: &str) -> Result<(), StoreError> {
        if self.sheet_titles().await?.iter().any(|t| t == title) {
            return Ok(());
        }

        tracing::info!("Creating {} sheet as it doesn't exist", title);
        let batch_update = format!("{}:batchUpdate", self.spreadsheet_id);
        self.call_on(
            &batch_update,
            Method::POST,
            &[],
            &[],
            Some(json!({"requests": [{"addSheet": {"properties": {"title": title}}}]})),
        )
        .await?;

        Ok(())
    }

    async fn read_values(&self, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let json = self.call(Method::GET, &["values", range], &[], None).await?;
        Ok(values_to_rows(&json["values"]))
    }

    async fn write_values(&self, range: &str, rows: Vec<Vec<String>>) -> Result<(), StoreError> {
        self.call(
            Method::PUT,
            &["values", range],
            &[("valueInputOption", "RAW")],
            Some(json!({ "values": rows })),
        )
        .await?;
        Ok(())
    }

    /// Creates the history worksheet and its header row on first use.
    async fn prepare_history(&self) -> Result<(), StoreError> {
        self.history_ready
            .get_or_try_init(|| async {
                self.ensure_sheet(&self.history_sheet).await?;
                let header = self.read_values(&a1(&self.history_sheet, "1:1")).await?;
                if header.iter().all(|row| row.is_empty()) {
                    let header = HISTORY_COLUMNS.iter().map(|c| c.to_string()).collect();
                    self.write_values(&a1(&self.history_sheet, "A1"), vec![header])
                        .await?;
                }
                Ok::<(), StoreError>(())
            })
            .await?;

        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SheetsStore {
    async fn read_all(&self) -> Result<History, StoreError> {
        self.prepare_history().await?;
        let rows = self.read_values(&a1(&self.history_sheet, "A:Z")).await?;
        let Some((header, rows)) = rows.split_first() else {
            return Ok(History::default());
        };

        let columns = ColumnIndex::from_header(header)?;
        // sheet row numbers are 1-based and row 1 is the header
        let history = History::from_rows(&columns, rows, 2);
        tracing::info!(
            "Loaded {} snapshots from sheet {}",
            history.snapshots.len(),
            self.history_sheet
        );

        Ok(history)
    }

    async fn append(&self, snapshots: &[VideoSnapshot]) -> Result<(), StoreError> {
        if snapshots.is_empty() {
            return Ok(());
        }

        self.prepare_history().await?;
        let rows = snapshots
            .iter()
            .map(|snapshot| snapshot.to_row())
            .collect::<Vec<Vec<String>>>();
        let range = format!("{}:append", a1(&self.history_sheet, "A1"));
        self.call(
            Method::POST,
            &["values", &range],
            &[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")],
            Some(json!({ "values": rows })),
        )
        .await?;
        tracing::info!("Updated history for {} videos", snapshots.len());

        Ok(())
    }

    async fn publish_current(&self, rows: &[ExportRow]) -> Result<(), StoreError> {
        self.ensure_sheet(&self.current_sheet).await?;
        let clear = format!("{}:clear", a1(&self.current_sheet, "A:Z"));
        self.call(Method::POST, &["values", &clear], &[], Some(json!({})))
            .await?;

        let mut values = vec![ExportRow::COLUMNS.iter().map(|c| c.to_string()).collect()];
        values.extend(rows.iter().map(|row| row.cells()));
        self.write_values(&a1(&self.current_sheet, "A1"), values).await?;
        tracing::info!("Updated current data sheet with {} videos", rows.len());

        Ok(())
    }
}

/// A1 range on a named sheet, quoting the name so spaces and punctuation survive.
pub fn a1(sheet: &str, range: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), range)
}

fn sheets_url(spreadsheet: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, StoreError> {
    let mut url = Url::parse(SHEETS_API)
        .map_err(|e| StoreError::Credentials(format!("invalid sheets endpoint: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::Credentials("sheets endpoint cannot take a path".to_string()))?
        .push(spreadsheet)
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    Ok(url)
}

/// Sheets returns trimmed rows of strings or numbers; everything becomes text.
pub fn values_to_rows(values: &Value) -> Vec<Vec<String>> {
    values
        .as_array()
        .into_iter()
        .flatten()
        .map(|row| {
            row.as_array()
                .into_iter()
                .flatten()
                .map(|cell| match cell {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_quote_sheet_names() {
        assert_eq!(a1("video_history", "A:Z"), "'video_history'!A:Z");
        assert_eq!(a1("Bob's data", "A1"), "'Bob''s data'!A1");
    }

    #[test]
    fn urls_keep_range_punctuation() {
        let range = format!("{}:append", a1("video history", "A1"));
        let url = sheets_url("sheet123", &["values", &range], &[("valueInputOption", "RAW")]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123/values/'video%20history'!A1:append?valueInputOption=RAW"
        );

        let url = sheets_url("sheet123:batchUpdate", &[], &[]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet123:batchUpdate"
        );
    }

    #[test]
    fn cell_values_become_text() {
        let values = json!([["video_id", "view_count"], ["abc", 1500], ["def"], []]);
        assert_eq!(
            values_to_rows(&values),
            vec![
                vec!["video_id".to_string(), "view_count".to_string()],
                vec!["abc".to_string(), "1500".to_string()],
                vec!["def".to_string()],
                Vec::new(),
            ]
        );
        assert!(values_to_rows(&Value::Null).is_empty());
    }
}
