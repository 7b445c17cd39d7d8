//! Buffered Google Sheets sink.
//!
//! Rows accumulate in memory and go out in batches of 100 through the
//! spreadsheets append endpoint. Authentication is the service-account JWT
//! grant; a 403 anywhere is reported with the account email so the user
//! knows exactly who to share the sheet with.

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use log::{info, warn};
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Signer;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::RowSink;

const BATCH_SIZE: usize = 100;
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

pub struct SheetsSink {
    client: Client,
    access_token: String,
    service_account_email: String,
    spreadsheet_id: String,
    sheet_name: String,
    buffer: Vec<Vec<String>>,
    header_written: bool,
    next_row: usize,
}

impl SheetsSink {
    /// Open the sink against an existing spreadsheet id, or create a new
    /// spreadsheet when the argument reads like a title instead.
    pub fn new(credentials_path: &str, sheet_id_or_name: &str) -> Result<Self> {
        let raw = fs::read_to_string(credentials_path)
            .with_context(|| format!("failed to read credentials file {credentials_path}"))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).context("credentials file is not a service-account key")?;

        let client = Client::new();
        let access_token = fetch_access_token(&client, &key)?;

        let mut sink = Self {
            client,
            access_token,
            service_account_email: key.client_email,
            spreadsheet_id: String::new(),
            sheet_name: String::new(),
            buffer: Vec::new(),
            header_written: false,
            next_row: 1,
        };

        if looks_like_sheet_id(sheet_id_or_name) {
            sink.spreadsheet_id = sheet_id_or_name.to_string();
            sink.sheet_name = sink.first_sheet_name()?;
            sink.next_row = sink.next_empty_row()?;
            sink.header_written = sink.next_row > 1;
            info!("appending to existing sheet starting at row {}", sink.next_row);
        } else {
            sink.sheet_name = sheet_id_or_name.to_string();
            sink.spreadsheet_id = sink.create_spreadsheet(sheet_id_or_name)?;
            info!("created new spreadsheet {}", sink.url());
        }

        Ok(sink)
    }

    pub fn url(&self) -> String {
        format!("https://docs.google.com/spreadsheets/d/{}/edit", self.spreadsheet_id)
    }

    fn permission_hint(&self) -> String {
        format!(
            "permission denied: share the sheet with {} (Editor access)",
            self.service_account_email
        )
    }

    fn first_sheet_name(&self) -> Result<String> {
        let resp = self
            .client
            .get(format!("{SHEETS_API}/{}", self.spreadsheet_id))
            .bearer_auth(&self.access_token)
            .send()
            .context("spreadsheet metadata request failed")?;
        if resp.status() == StatusCode::FORBIDDEN {
            bail!(self.permission_hint());
        }
        let body: Value = resp
            .error_for_status()
            .context("failed to read spreadsheet metadata")?
            .json()?;
        Ok(body["sheets"][0]["properties"]["title"]
            .as_str()
            .unwrap_or("Sheet1")
            .to_string())
    }

    fn next_empty_row(&self) -> Result<usize> {
        let resp = self
            .client
            .get(format!(
                "{SHEETS_API}/{}/values/{}",
                self.spreadsheet_id,
                encode_range(&format!("{}!A:A", self.sheet_name))
            ))
            .bearer_auth(&self.access_token)
            .send()
            .context("sheet range request failed")?;
        if resp.status() == StatusCode::FORBIDDEN {
            bail!(self.permission_hint());
        }
        let body: Value = resp.error_for_status()?.json()?;
        Ok(body["values"].as_array().map_or(1, |rows| rows.len() + 1))
    }

    fn create_spreadsheet(&self, title: &str) -> Result<String> {
        let resp = self
            .client
            .post(SHEETS_API)
            .bearer_auth(&self.access_token)
            .json(&json!({ "properties": { "title": title } }))
            .send()
            .context("spreadsheet create request failed")?;
        if resp.status() == StatusCode::FORBIDDEN {
            bail!(self.permission_hint());
        }
        let body: Value = resp
            .error_for_status()
            .context("failed to create spreadsheet")?
            .json()?;
        body["spreadsheetId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("create response missing spreadsheetId"))
    }

    fn append_buffer(&mut self) -> Result<()> {
        let range = encode_range(&format!("{}!A{}", self.sheet_name, self.next_row));
        let resp = self
            .client
            .post(format!(
                "{SHEETS_API}/{}/values/{}:append?valueInputOption=RAW",
                self.spreadsheet_id, range
            ))
            .bearer_auth(&self.access_token)
            .json(&json!({ "values": &self.buffer }))
            .send()
            .context("append request failed")?;
        if resp.status() == StatusCode::FORBIDDEN {
            bail!(self.permission_hint());
        }
        resp.error_for_status().context("failed to append rows")?;

        info!("wrote {} rows to Google Sheets", self.buffer.len());
        self.next_row += self.buffer.len();
        self.buffer.clear();
        Ok(())
    }
}

impl RowSink for SheetsSink {
    fn write_header(&mut self, header: &[&str]) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.buffer.push(header.iter().map(|s| s.to_string()).collect());
        self.header_written = true;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.buffer.push(row.to_vec());
        if self.buffer.len() >= BATCH_SIZE {
            // a failed batch stays buffered for the next attempt
            if let Err(e) = self.flush() {
                warn!("batch write to Google Sheets failed: {e:#}");
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.append_buffer()
    }
}

/// Spreadsheet ids are long URL-safe tokens; anything else is a title for a
/// new spreadsheet.
fn looks_like_sheet_id(value: &str) -> bool {
    value.len() > 20
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn encode_range(range: &str) -> String {
    range.replace(' ', "%20")
}

fn fetch_access_token(client: &Client, key: &ServiceAccountKey) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "RS256", "typ": "JWT" }).to_string());
    let claims = URL_SAFE_NO_PAD.encode(
        json!({
            "iss": key.client_email,
            "scope": SHEETS_SCOPE,
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        })
        .to_string(),
    );
    let signing_input = format!("{header}.{claims}");

    let pkey = PKey::private_key_from_pem(key.private_key.as_bytes())
        .context("invalid private key in credentials file")?;
    let mut signer = Signer::new(MessageDigest::sha256(), &pkey).context("failed to initialize signer")?;
    signer.update(signing_input.as_bytes())?;
    let signature = URL_SAFE_NO_PAD.encode(signer.sign_to_vec()?);

    let assertion = format!("{signing_input}.{signature}");
    let resp = client
        .post(&key.token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .context("token request failed")?
        .error_for_status()
        .context("service-account token exchange rejected")?;
    let body: Value = resp.json().context("token response is not JSON")?;
    body["access_token"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("token response missing access_token"))
}
