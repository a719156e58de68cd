//! Planning Center Online
//!
//! Two sources share one JSON:API client:
//! - `checkins`: event-time headcounts, named by event (ministry), plus
//!   individual check-ins with their person for first-time attendees
//! - `groups`: active small groups and their memberships
//!
//! Listing endpoints are paginated through `links.next`.

use super::http;
use super::*;
use crate::config::{CheckinsSourceConfig, GroupsSourceConfig};
use crate::transform;
use chrono::{Duration, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Guard against a `links.next` cycle
const MAX_PAGES: usize = 200;

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Resource>,
    #[serde(default)]
    included: Vec<Resource>,
    links: Option<Links>,
}

#[derive(Deserialize)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Resource {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Value,
    #[serde(default)]
    relationships: Value,
}

impl Resource {
    fn attr_str(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }

    /// `relationships.<name>.data.id`
    fn related_id(&self, name: &str) -> Option<&str> {
        self.relationships
            .get(name)?
            .get("data")?
            .get("id")?
            .as_str()
    }
}

/// Collected pages of a JSON:API listing
#[derive(Default)]
struct Listing {
    data: Vec<Resource>,
    included: Vec<Resource>,
}

impl Listing {
    /// Included resources of `kind` by id
    fn included_by_id(&self, kind: &str) -> HashMap<&str, &Resource> {
        self.included
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| (r.id.as_str(), r))
            .collect()
    }
}

/// Minimal JSON:API client for the Planning Center REST API
struct PcoClient {
    client: Client,
    base_url: String,
}

impl PcoClient {
    fn new(base_url: &str) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_all(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<Listing, SourceError> {
        let mut listing = Listing::default();
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query);

        for _ in 0..MAX_PAGES {
            let response = http::send(request.bearer_auth(token)).await?;
            let page: Page = http::read_json(response).await?;
            listing.data.extend(page.data);
            listing.included.extend(page.included);

            match page.links.and_then(|l| l.next) {
                Some(next) if !next.is_empty() => request = self.client.get(next),
                _ => return Ok(listing),
            }
        }

        // A partial listing would be stored as a short week
        Err(SourceError::Api(format!(
            "{} still had more pages after {}",
            path, MAX_PAGES
        )))
    }
}

// ========== Check-ins ==========

pub struct CheckinsSource {
    pco: PcoClient,
    config: CheckinsSourceConfig,
    offset: FixedOffset,
}

impl CheckinsSource {
    pub fn new(config: CheckinsSourceConfig, offset: FixedOffset) -> Self {
        Self {
            pco: PcoClient::new(&config.base_url),
            config,
            offset,
        }
    }

    fn ministry_for(&self, event_name: &str) -> String {
        self.config
            .ministry_aliases
            .get(event_name)
            .cloned()
            .unwrap_or_else(|| event_name.to_string())
    }

    /// Ministry of the event `resource` belongs to
    fn event_ministry(&self, resource: &Resource, events: &HashMap<&str, &Resource>) -> Option<String> {
        resource
            .related_id("event")
            .and_then(|id| events.get(id))
            .and_then(|e| e.attr_str("name"))
            .map(|n| self.ministry_for(&n))
    }
}

#[async_trait]
impl Source for CheckinsSource {
    fn name(&self) -> &str {
        "checkins"
    }

    fn description(&self) -> &str {
        "Planning Center check-in headcounts per ministry and service"
    }

    fn integration(&self) -> &str {
        "planning_center"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Attendance
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("total_attendance", "people", "sum"),
            MetricDefinition::new("attendance_930", "people", "sum"),
            MetricDefinition::new("attendance_1100", "people", "sum"),
            MetricDefinition::new("attendance_1630", "people", "sum"),
            MetricDefinition::new("total_new_kids", "people", "sum"),
            MetricDefinition::new("new_kids_930", "people", "sum"),
            MetricDefinition::new("new_kids_1100", "people", "sum"),
            MetricDefinition::new("new_kids_1630", "people", "sum"),
            MetricDefinition::new("new_students", "people", "sum"),
        ]
    }

    async fn fetch(
        &self,
        period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        // Widen by a day on each side; local-date filtering happens in summarize
        let from = Period::from_week_start(period.start - Duration::days(1));
        let until = Period::from_week_end(period.end + Duration::days(1));
        let query = [
            ("include", "event".to_string()),
            ("where[starts_at][gte]", from.start_rfc3339()),
            ("where[starts_at][lte]", until.end_rfc3339()),
            ("per_page", "100".to_string()),
        ];

        let listing = self
            .pco
            .get_all("/check-ins/v2/event_times", &query, &credential.secret)
            .await?;
        let events = listing.included_by_id("Event");

        let mut records: Vec<RawRecord> = listing
            .data
            .iter()
            .filter(|r| r.kind == "EventTime")
            .map(|et| {
                let count = match (et.attr_f64("regular_count"), et.attr_f64("guest_count")) {
                    (None, None) => None,
                    (r, g) => Some(r.unwrap_or(0.0) + g.unwrap_or(0.0)),
                };

                RawRecord::Headcount {
                    event_time_id: et.id.clone(),
                    ministry: self.event_ministry(et, &events),
                    starts_at: et.attr_str("starts_at"),
                    count,
                }
            })
            .collect();

        let query = [
            ("include", "person,event".to_string()),
            ("where[created_at][gte]", from.start_rfc3339()),
            ("where[created_at][lte]", until.end_rfc3339()),
            ("per_page", "100".to_string()),
        ];
        let check_ins = self
            .pco
            .get_all("/check-ins/v2/check_ins", &query, &credential.secret)
            .await?;
        let events = check_ins.included_by_id("Event");
        let people = check_ins.included_by_id("Person");

        records.extend(check_ins.data.iter().filter(|r| r.kind == "CheckIn").map(|c| {
            let person_id = c.related_id("person");
            RawRecord::CheckIn {
                id: c.id.clone(),
                ministry: self.event_ministry(c, &events),
                checked_in_at: c.attr_str("created_at"),
                person_created_at: person_id
                    .and_then(|id| people.get(id))
                    .and_then(|p| p.attr_str("created_at")),
                person_id: person_id.map(str::to_string),
            }
        }));

        Ok(records)
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::checkins::summarize(
            self.name(),
            period,
            records,
            self.offset,
            &self.config.student_ministries,
        )
    }
}

// ========== Groups ==========

pub struct GroupsSource {
    pco: PcoClient,
    config: GroupsSourceConfig,
}

impl GroupsSource {
    pub fn new(config: GroupsSourceConfig) -> Self {
        Self {
            pco: PcoClient::new(&config.base_url),
            config,
        }
    }

    /// Whether memberships of this group feed any metric
    fn is_tracked(&self, name: &str, group_type: &str) -> bool {
        group_type.eq_ignore_ascii_case(&self.config.group_type)
            || (group_type.eq_ignore_ascii_case(&self.config.coaching_group_type)
                && name.trim().eq_ignore_ascii_case(&self.config.coaching_group))
    }
}

#[async_trait]
impl Source for GroupsSource {
    fn name(&self) -> &str {
        "groups"
    }

    fn description(&self) -> &str {
        "Planning Center small groups, participants, leaders and coaches"
    }

    fn integration(&self) -> &str {
        "planning_center"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Groups
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("number_of_groups", "groups", "snapshot"),
            MetricDefinition::new("total_groups_attendance", "people", "snapshot"),
            MetricDefinition::new("group_leaders", "people", "snapshot"),
            MetricDefinition::new("coaches", "people", "snapshot"),
        ]
    }

    async fn fetch(
        &self,
        _period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let query = [
            ("include", "group_type".to_string()),
            ("per_page", "100".to_string()),
        ];
        let listing = self
            .pco
            .get_all("/groups/v2/groups", &query, &credential.secret)
            .await?;
        let group_types = listing.included_by_id("GroupType");

        let mut records = Vec::new();
        let mut tracked = Vec::new();

        for group in listing.data.iter().filter(|r| r.kind == "Group") {
            let name = group.attr_str("name").unwrap_or_default();
            let group_type = group
                .related_id("group_type")
                .and_then(|id| group_types.get(id))
                .and_then(|t| t.attr_str("name"));
            let archived = group
                .attributes
                .get("archived_at")
                .map_or(false, |v| !v.is_null());

            if !archived && self.is_tracked(&name, group_type.as_deref().unwrap_or_default()) {
                tracked.push(group.id.clone());
            }
            records.push(RawRecord::Group {
                id: group.id.clone(),
                name,
                group_type,
                archived,
            });
        }

        for group_id in tracked {
            let path = format!("/groups/v2/groups/{}/memberships", urlencoding::encode(&group_id));
            let members = self
                .pco
                .get_all(&path, &[("per_page", "100".to_string())], &credential.secret)
                .await?;

            records.extend(members.data.iter().map(|m| RawRecord::Membership {
                group_id: group_id.clone(),
                person_id: m.related_id("person").map(str::to_string),
                role: m.attr_str("role"),
            }));
        }

        Ok(records)
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::groups::summarize(self.name(), period, records, &self.config)
    }
}
