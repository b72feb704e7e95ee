//! Builder search against the directory's list endpoint

use serde_json::Value;

use super::client::RegistryClient;
use super::endpoints::SEARCH_PATH;
use super::models::{Row, json_type_name};
use crate::error::FetchError;

/// Search filters. Unset or blank fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    pub builder_name: Option<String>,
    pub builder_location: Option<String>,
    pub builder_num: Option<String>,
    pub officer_director: Option<String>,
    pub umbrella_co: Option<String>,
    pub licence_status: Option<String>,
    pub years_active: Option<String>,
    pub page: u32,
}

impl SearchCriteria {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            builder_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Query parameters in the order the directory's web client sends them
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let fields = [
            ("builderName", &self.builder_name),
            ("builderLocation", &self.builder_location),
            ("builderNum", &self.builder_num),
            ("officerDirector", &self.officer_director),
            ("umbrellaCo", &self.umbrella_co),
            ("licenceStatus", &self.licence_status),
            ("yearsActive", &self.years_active),
        ];

        let mut params: Vec<(&'static str, String)> = fields
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (name, v.to_string()))
            })
            .collect();

        params.push(("page", self.page.max(1).to_string()));
        params
    }
}

impl RegistryClient {
    /// Run a builder search and return the matching rows
    pub async fn search_builders(&self, criteria: &SearchCriteria) -> Result<Vec<Row>, FetchError> {
        let url = format!("{}{}", self.base_url(), SEARCH_PATH);
        let owned = criteria.query_params();
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let value = self.get_json(&url, &params).await?;
        rows_from_search(&url, value)
    }
}

fn rows_from_search(url: &str, value: Value) -> Result<Vec<Row>, FetchError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(FetchError::parse(
                    url,
                    format!("search result {} is a {}, not an object", idx, json_type_name(&other)),
                )),
            })
            .collect(),
        other => Err(FetchError::parse(
            url,
            format!("expected a list of builders, got {}", json_type_name(&other)),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::resilience::ResilienceConfig;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_only_non_empty_params_sent() {
        let criteria = SearchCriteria {
            builder_name: Some("Acme".into()),
            builder_location: Some("   ".into()),
            licence_status: Some("Licensed".into()),
            ..SearchCriteria::default()
        };

        let params = criteria.query_params();
        assert_eq!(
            params,
            vec![
                ("builderName", "Acme".to_string()),
                ("licenceStatus", "Licensed".to_string()),
                ("page", "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_list_search_response_rejected() {
        let err = rows_from_search("http://x", json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_search_builders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/builders"))
            .and(query_param("builderName", "Acme"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ID": "B1", "NAME": "Acme Homes"},
                {"ID": "B2", "NAME": "Acme Custom"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::with_options(
            &server.uri(),
            "obd-cli-test",
            &BTreeMap::new(),
            &ResilienceConfig::disabled(),
        )
        .unwrap();

        let rows = client
            .search_builders(&SearchCriteria::by_name("Acme"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["NAME"], "Acme Homes");
    }
}
