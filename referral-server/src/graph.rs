use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use referral_core::BusyInterval;

use crate::recording::{create_http_client, RecordingLogger, UpstreamService};

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens closer than this to expiry are refreshed.
const TOKEN_EXPIRY_BUFFER_SECS: u64 = 300;

/// Upper bound on calendarView pages followed for one availability query.
const MAX_CALENDAR_PAGES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Where the referral workbook lives in the document library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookLocation {
    pub drive_id: String,
    pub item_id: String,
    pub worksheet: String,
    pub table: String,
}

/// Cell values of a worksheet range, with the sheet row number of the first row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RangeValues {
    pub first_row: u32,
    pub values: Vec<Vec<Value>>,
}

#[async_trait]
pub trait WorkbookApi: Send + Sync {
    /// Append rows to the end of the referral table.
    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<()>;

    /// Read the used part of `address` (e.g. `A:L`).
    async fn read_used_range(&self, address: &str) -> Result<RangeValues>;

    /// Overwrite the cells at `address` (e.g. `J5:L5`).
    async fn patch_range(&self, address: &str, values: Vec<Vec<String>>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEventRequest {
    pub subject: String,
    pub body_html: String,
    /// Local wall-clock times in `time_zone`.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub time_zone: String,
    pub attendee_email: String,
    pub attendee_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedEvent {
    pub id: String,
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn create_event(&self, event: &CalendarEventRequest) -> Result<CreatedEvent>;

    /// Busy intervals of the practice calendar between `start` and `end`.
    async fn calendar_view(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<BusyInterval>>;
}

#[derive(Clone)]
pub struct GraphClient {
    client: ClientWithMiddleware,
    credentials: Option<GraphCredentials>,
    workbook: Option<WorkbookLocation>,
    calendar_user: Option<String>,
    token_cache: Arc<RwLock<Option<(String, SystemTime)>>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    address: String,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct CalendarViewResponse {
    #[serde(default)]
    value: Vec<CalendarEntry>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarEntry {
    start: GraphDateTime,
    end: GraphDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
}

impl GraphClient {
    pub fn new(
        credentials: Option<GraphCredentials>,
        workbook: Option<WorkbookLocation>,
        calendar_user: Option<String>,
        recording_logger: Option<RecordingLogger>,
    ) -> Self {
        Self {
            client: create_http_client(UpstreamService::Graph, recording_logger),
            credentials,
            workbook,
            calendar_user,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn access_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expires_at)) = cache.as_ref() {
                if expires_at
                    .duration_since(SystemTime::now())
                    .unwrap_or_default()
                    .as_secs()
                    > TOKEN_EXPIRY_BUFFER_SECS
                {
                    return Ok(token.clone());
                }
            }
        }

        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| anyhow!("Azure AD credentials are not configured"))?;

        let url = format!("{}/{}/oauth2/v2.0/token", LOGIN_BASE, credentials.tenant_id);
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &credentials.client_id)
            .append_pair("client_secret", &credentials.client_secret)
            .append_pair("scope", GRAPH_SCOPE)
            .append_pair("grant_type", "client_credentials")
            .finish();

        info!("Requesting new Graph access token");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await
            .context("Failed to send Graph token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Graph token request failed: {} - {}", status, error_text);
            return Err(anyhow!("Graph token request failed: {} - {}", status, error_text));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .context("Failed to parse Graph token response")?;

        let expires_at = SystemTime::now() + Duration::from_secs(token_response.expires_in);
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some((token_response.access_token.clone(), expires_at));
        }

        Ok(token_response.access_token)
    }

    fn workbook(&self) -> Result<&WorkbookLocation> {
        self.workbook
            .as_ref()
            .ok_or_else(|| anyhow!("SHAREPOINT_DRIVE_ID and EXCEL_FILE_ID are not configured"))
    }

    fn calendar_user(&self) -> Result<&str> {
        self.calendar_user
            .as_deref()
            .ok_or_else(|| anyhow!("CALENDAR_EMAIL is not configured"))
    }

    fn worksheet_url(&self, location: &WorkbookLocation) -> String {
        format!(
            "{}/drives/{}/items/{}/workbook/worksheets/{}",
            GRAPH_API_BASE,
            location.drive_id,
            location.item_id,
            urlencode_segment(&location.worksheet)
        )
    }

    async fn send_json(&self, request: RequestBuilder, operation: &str) -> Result<Value> {
        let token = self.access_token().await?;
        let response = request
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .with_context(|| format!("Failed to send Graph {} request", operation))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Graph {} failed: {} - {}", operation, status, error_text);
            return Err(anyhow!("Graph {} failed: {} - {}", operation, status, error_text));
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read Graph {} response", operation))?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).with_context(|| format!("Failed to parse Graph {} response", operation))
    }
}

#[async_trait]
impl WorkbookApi for GraphClient {
    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<()> {
        let location = self.workbook()?;
        let url = format!(
            "{}/tables/{}/rows",
            self.worksheet_url(location),
            urlencode_segment(&location.table)
        );
        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&json!({ "values": rows }))?);

        self.send_json(request, "table row append").await?;
        Ok(())
    }

    async fn read_used_range(&self, address: &str) -> Result<RangeValues> {
        let location = self.workbook()?;
        let url = format!(
            "{}/range(address='{}')/usedRange(valuesOnly=true)",
            self.worksheet_url(location),
            address
        );
        let body = self.send_json(self.client.get(&url), "used range read").await?;
        let range: RangeResponse =
            serde_json::from_value(body).context("Unexpected used range response shape")?;

        Ok(RangeValues {
            first_row: first_row_of_address(&range.address).unwrap_or(1),
            values: range.values,
        })
    }

    async fn patch_range(&self, address: &str, values: Vec<Vec<String>>) -> Result<()> {
        let location = self.workbook()?;
        let url = format!("{}/range(address='{}')", self.worksheet_url(location), address);
        let request = self
            .client
            .patch(&url)
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&json!({ "values": values }))?);

        self.send_json(request, "range update").await?;
        Ok(())
    }
}

#[async_trait]
impl CalendarApi for GraphClient {
    async fn create_event(&self, event: &CalendarEventRequest) -> Result<CreatedEvent> {
        let user = self.calendar_user()?;
        let url = format!("{}/users/{}/events", GRAPH_API_BASE, user);
        let body = json!({
            "subject": event.subject,
            "body": { "contentType": "HTML", "content": event.body_html },
            "start": {
                "dateTime": event.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.time_zone,
            },
            "end": {
                "dateTime": event.end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": event.time_zone,
            },
            "attendees": [{
                "emailAddress": { "address": event.attendee_email, "name": event.attendee_name },
                "type": "required",
            }],
        });
        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&body)?);

        let created = self.send_json(request, "event creation").await?;
        serde_json::from_value(created).context("Unexpected event creation response shape")
    }

    async fn calendar_view(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<BusyInterval>> {
        let user = self.calendar_user()?;
        let first_url = format!(
            "{}/users/{}/calendarView?startDateTime={}&endDateTime={}&$select=start,end&$orderby=start/dateTime&$top=100",
            GRAPH_API_BASE,
            user,
            start.format("%Y-%m-%dT%H:%M:%SZ"),
            end.format("%Y-%m-%dT%H:%M:%SZ"),
        );

        collect_busy(first_url, MAX_CALENDAR_PAGES, |url| self.calendar_view_page(url)).await
    }
}

impl GraphClient {
    async fn calendar_view_page(&self, url: String) -> Result<CalendarViewResponse> {
        // Ask for UTC so event times need no zone conversion
        let request = self
            .client
            .get(&url)
            .header("Prefer", "outlook.timezone=\"UTC\"");
        let body = self.send_json(request, "calendar view").await?;
        serde_json::from_value(body).context("Unexpected calendar view response shape")
    }
}

/// Follow `@odata.nextLink` for at most `max_pages` pages. A view that still
/// has more pages after that is an error: a truncated busy list would offer
/// booked hours as free.
async fn collect_busy<F, Fut>(first_url: String, max_pages: usize, mut fetch_page: F) -> Result<Vec<BusyInterval>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<CalendarViewResponse>>,
{
    let mut busy = Vec::new();
    let mut next_url = Some(first_url);

    for _ in 0..max_pages {
        let Some(url) = next_url.take() else {
            break;
        };
        let page = fetch_page(url).await?;
        for entry in page.value {
            busy.push(BusyInterval::new(
                parse_graph_utc(&entry.start.date_time)?,
                parse_graph_utc(&entry.end.date_time)?,
            ));
        }
        next_url = page.next_link;
    }

    if next_url.is_some() {
        warn!("Calendar view still had more pages after {} pages", max_pages);
        bail!("Calendar view exceeds {} pages; refusing a partial busy list", max_pages);
    }
    Ok(busy)
}

/// Graph returns `2024-06-10T17:00:00.0000000` with the zone given separately.
fn parse_graph_utc(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .with_context(|| format!("Unparseable Graph dateTime: {}", raw))
}

/// Row number of the top-left cell of an address like `Referrals!A1:L42`.
fn first_row_of_address(address: &str) -> Option<u32> {
    let cells = address.rsplit('!').next()?;
    let first_cell = cells.split(':').next()?;
    let digits: String = first_cell.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    digits.parse().ok()
}

fn urlencode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
