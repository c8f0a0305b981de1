//! Google Sheets-backed durable row store
//!
//! Talks to the Sheets v4 `values` API. Row 1 holds the header; data rows
//! start at row 2 and the sheet row number is the [`RowRef`]. The OAuth
//! bearer token is obtained out of band and handed in at construction.
//!
//! No retries: a timeout or HTTP failure surfaces as [`StoreError::Remote`],
//! since repeating an append-on-miss could duplicate rows.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::durable::{AnnotationRow, RowRef, RowStore, HEADER};
use super::StoreError;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const USER_AGENT: &str = concat!("pqa/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// `values.get` response body
#[derive(Debug, Default, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

pub struct SheetsRowStore {
    http_client: Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    access_token: String,
}

impl SheetsRowStore {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StoreError::Remote(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: SHEETS_BASE_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            access_token: access_token.into(),
        })
    }

    /// Point at a different API root (e.g. a local emulator)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Write the header row into an empty sheet
    pub async fn ensure_header(&self) -> Result<(), StoreError> {
        let existing = self.get_values(&self.range("A1:D1")).await?;
        if existing.is_empty() {
            let header = HEADER.map(String::from);
            self.append_cells(&header).await?;
            info!(sheet = %self.sheet_name, "Wrote header row to empty sheet");
        }
        Ok(())
    }

    fn range(&self, cells: &str) -> String {
        format!("{}!{}", self.sheet_name, cells)
    }

    fn values_url(&self, range: &str) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| StoreError::Remote(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Remote(format!("invalid base URL {}", self.base_url)))?
            .extend([self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.values_url(range)?;
        debug!(%range, "Reading sheet values");
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("network error: {}", e)))?;
        let body: ValueRange = check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Remote(format!("unexpected response: {}", e)))?;
        Ok(body.values)
    }

    async fn append_cells(&self, cells: &[String; 4]) -> Result<(), StoreError> {
        let mut url = self.values_url(&format!("{}:append", self.range("A:D")))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": [cells] }))
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("network error: {}", e)))?;
        check(response).await?;
        Ok(())
    }
}

/// Map a non-success status to an error carrying the response text
async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(StoreError::Remote(format!("HTTP {}: {}", status.as_u16(), error_text)))
}

/// Pad short rows (the API drops trailing empty cells)
fn to_row(cells: Vec<String>) -> AnnotationRow {
    let mut cells = cells.into_iter();
    let mut next = || cells.next().unwrap_or_default();
    AnnotationRow {
        annotator_id: next(),
        session_id: next(),
        full_json: next(),
        timestamp: next(),
    }
}

/// Data rows of an `A:D` read; the first row is the header at sheet row 1
fn data_rows(values: Vec<Vec<String>>) -> Vec<(RowRef, AnnotationRow)> {
    values
        .into_iter()
        .enumerate()
        .skip(1)
        .map(|(i, cells)| (RowRef(i as u64 + 1), to_row(cells)))
        .collect()
}

#[async_trait]
impl RowStore for SheetsRowStore {
    async fn fetch_rows(&self) -> Result<Vec<(RowRef, AnnotationRow)>, StoreError> {
        let values = self.get_values(&self.range("A:D")).await?;
        Ok(data_rows(values))
    }

    async fn fetch_row(&self, at: RowRef) -> Result<Option<AnnotationRow>, StoreError> {
        let values = self
            .get_values(&self.range(&format!("A{0}:D{0}", at.0)))
            .await?;
        Ok(values.into_iter().next().map(to_row))
    }

    async fn overwrite_row(&self, at: RowRef, row: &AnnotationRow) -> Result<(), StoreError> {
        let range = self.range(&format!("A{0}:D{0}", at.0));
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");

        let response = self
            .http_client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [row.cells()],
            }))
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("network error: {}", e)))?;
        check(response).await?;
        Ok(())
    }

    async fn append_row(&self, row: &AnnotationRow) -> Result<(), StoreError> {
        let cells = row.cells().map(String::from);
        self.append_cells(&cells).await
    }

    fn backend_name(&self) -> &'static str {
        "google-sheets"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AnnotatorId, SessionId};
    use crate::persistence::{DurableStore, Upsert};
    use crate::record::SessionRecord;
    use axum::{
        body::Bytes,
        extract::State,
        http::{header, HeaderMap, Method, Uri},
        Json, Router,
    };
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn store() -> SheetsRowStore {
        SheetsRowStore::new("sheet-123", "Annotations 2025", "token").unwrap()
    }

    #[test]
    fn test_values_url_encodes_range() {
        let url = store().values_url("Annotations 2025!A:D").unwrap();
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/sheet-123/values/Annotations%202025!A:D"
        );
    }

    #[test]
    fn test_data_rows_skip_header_and_number_from_two() {
        let values = vec![
            HEADER.iter().map(|s| s.to_string()).collect(),
            vec!["1".into(), "1_a".into(), "{}".into(), "t1".into()],
            vec!["2".into(), "2_b".into()],
        ];
        let rows = data_rows(values);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, RowRef(2));
        assert_eq!(rows[0].1.timestamp, "t1");
        assert_eq!(rows[1].0, RowRef(3));
        assert_eq!(rows[1].1.session_id, "2_b");
        assert_eq!(rows[1].1.full_json, "");
    }

    #[test]
    fn test_empty_sheet_has_no_rows() {
        assert!(data_rows(Vec::new()).is_empty());
        let body: ValueRange = serde_json::from_str(r#"{"range": "Sheet1!A1:D1"}"#).unwrap();
        assert!(body.values.is_empty());
    }

    /// In-memory stand-in for the `values` API of one spreadsheet tab
    #[derive(Clone, Default)]
    struct StubSheet {
        rows: Arc<Mutex<Vec<Vec<String>>>>,
        /// (method, range, authorization) per request
        calls: Arc<Mutex<Vec<(Method, String, String)>>>,
    }

    /// "A7:D7" -> 7
    fn row_number(cells: &str) -> Option<usize> {
        cells.strip_prefix('A')?.split(':').next()?.parse().ok()
    }

    async fn stub_values(
        State(sheet): State<StubSheet>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Json<Value> {
        let range = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let cells = range.split_once('!').map(|(_, c)| c.to_string()).unwrap_or_default();
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        sheet.calls.lock().unwrap().push((method.clone(), cells.clone(), auth));

        let mut rows = sheet.rows.lock().unwrap();
        let written = || -> Vec<String> {
            let body: Value = serde_json::from_slice(&body).unwrap();
            serde_json::from_value(body["values"][0].clone()).unwrap()
        };
        match (method.as_str(), cells.as_str()) {
            ("GET", "A:D") => Json(json!({ "range": range, "values": rows.to_vec() })),
            ("GET", _) => {
                let n = row_number(&cells).unwrap();
                match rows.get(n - 1) {
                    Some(row) => Json(json!({ "range": range, "values": [row] })),
                    None => Json(json!({ "range": range })),
                }
            }
            ("POST", "A:D:append") => {
                rows.push(written());
                Json(json!({}))
            }
            ("PUT", _) => {
                let n = row_number(&cells).unwrap();
                rows[n - 1] = written();
                Json(json!({}))
            }
            (other, _) => panic!("unexpected {} {}", other, range),
        }
    }

    async fn serve_stub(sheet: StubSheet) -> String {
        let app = Router::new().fallback(stub_values).with_state(sheet);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v4/spreadsheets", addr)
    }

    #[tokio::test]
    async fn test_upsert_against_sheets_api() {
        let sheet = StubSheet::default();
        let base_url = serve_stub(sheet.clone()).await;
        let store = SheetsRowStore::new("sheet-123", "Annotations", "token")
            .unwrap()
            .with_base_url(base_url);

        store.ensure_header().await.unwrap();
        store.ensure_header().await.unwrap();
        assert_eq!(sheet.rows.lock().unwrap().clone(), vec![HEADER.map(String::from).to_vec()]);
        sheet.calls.lock().unwrap().clear();

        let durable = DurableStore::new(Arc::new(store));
        let annotator = AnnotatorId::parse("3").unwrap();
        let session = SessionId::parse("3_5ee75ee7").unwrap();

        let first = durable.save(&annotator, &session, &SessionRecord::new()).await.unwrap();
        assert_eq!(first.upsert, Upsert::Appended);

        let mut record = SessionRecord::new();
        record.set_workflow_feedback("again".into());
        let second = durable.save(&annotator, &session, &record).await.unwrap();
        assert_eq!(second.upsert, Upsert::Updated);

        let calls = sheet.calls.lock().unwrap().clone();
        let writes: Vec<(Method, String)> = calls
            .iter()
            .filter(|(method, _, _)| *method != Method::GET)
            .map(|(method, cells, _)| (method.clone(), cells.clone()))
            .collect();
        assert_eq!(
            writes,
            vec![
                (Method::POST, "A:D:append".to_string()),
                (Method::PUT, "A2:D2".to_string()),
            ]
        );
        assert!(calls.iter().any(|(method, cells, _)| *method == Method::GET && cells == "A2:D2"));
        assert!(calls.iter().all(|(_, _, auth)| auth == "Bearer token"));

        let rows = sheet.rows.lock().unwrap().clone();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "3");
        assert_eq!(rows[1][1], "3_5ee75ee7");
        assert_eq!(rows[1][3], second.saved_at.to_rfc3339());

        let loaded = durable.load(&annotator, &session).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_feedback, "again");
    }

    #[tokio::test]
    async fn test_http_error_surfaces_as_remote() {
        let app = Router::new().fallback(|| async {
            (axum::http::StatusCode::FORBIDDEN, "caller lacks permission")
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let store = SheetsRowStore::new("sheet-123", "Annotations", "token")
            .unwrap()
            .with_base_url(format!("http://{}/v4/spreadsheets", addr));
        let err = store.fetch_rows().await.unwrap_err();
        match err {
            StoreError::Remote(message) => {
                assert!(message.contains("403"));
                assert!(message.contains("caller lacks permission"));
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }
}
