//! Resource enumeration through the resource management API.

use super::valid_tags;
use crate::cache::ResourceInfoProvider;
use crate::cloudeye::{authorize, ensure_success};
use crate::core::config::{CloudConfig, RmsResourceConfig};
use crate::core::{BridgeError, MetricIdentifier, ResourceInfo, ResourceLabel, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const LIST_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
struct ListResourcesResponse {
    #[serde(default)]
    resources: Vec<ResourceEntity>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResourceEntity {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ep_id: String,
    #[serde(default)]
    tags: HashMap<String, String>,
}

/// Enumerates one provider/type pair and turns each resource into labels
/// keyed by its id.
#[derive(Debug, Clone)]
pub struct RmsResourceProvider {
    http: reqwest::Client,
    endpoint: String,
    domain_id: String,
    region: String,
    token: Option<String>,
    namespace: String,
    resource: RmsResourceConfig,
}

impl RmsResourceProvider {
    pub fn new(
        http: reqwest::Client,
        cloud: &CloudConfig,
        namespace: impl Into<String>,
        resource: RmsResourceConfig,
    ) -> Self {
        Self {
            http,
            endpoint: cloud.rms_endpoint.trim_end_matches('/').to_string(),
            domain_id: cloud.domain_id.clone(),
            region: cloud.region.clone(),
            token: cloud.auth_token.clone(),
            namespace: namespace.into(),
            resource,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/resource-manager/domains/{}/provider/{}/type/{}/resources",
            self.endpoint, self.domain_id, self.resource.provider, self.resource.resource_type
        )
    }

    async fn list_page(&self, marker: Option<&str>) -> Result<ListResourcesResponse> {
        let limit = LIST_PAGE_LIMIT.to_string();
        let mut query = vec![("region_id", self.region.as_str()), ("limit", limit.as_str())];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }

        let request = self.http.get(self.url()).query(&query);
        let response = authorize(request, self.token.as_deref()).send().await?;
        let response = ensure_success(response).await?;
        response
            .json::<ListResourcesResponse>()
            .await
            .map_err(|e| BridgeError::decode(format!("resource list page: {}", e)))
    }

    async fn list_resources(&self) -> Result<Vec<ResourceEntity>> {
        let mut resources = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self.list_page(marker.as_deref()).await?;
            if page.resources.is_empty() {
                break;
            }
            resources.extend(page.resources);

            let next = page
                .page_info
                .and_then(|info| info.next_marker)
                .filter(|m| !m.is_empty());
            match next {
                None => break,
                Some(next) if marker.as_deref() == Some(next.as_str()) => {
                    warn!(namespace = %self.namespace, marker = %next, "Resource listing returned the same marker twice, stopping");
                    break;
                },
                Some(next) => marker = Some(next),
            }
        }

        Ok(resources)
    }

    fn build_info(&self, resources: Vec<ResourceEntity>) -> ResourceInfo {
        let mut info = ResourceInfo::default();

        for resource in resources {
            for metric_name in &self.resource.metric_names {
                info.filter_metrics.push(
                    MetricIdentifier::new(self.namespace.as_str(), metric_name.as_str())
                        .with_dimension(self.resource.dimension.as_str(), resource.id.as_str()),
                );
            }

            let tags = valid_tags(&resource.tags);
            let mut label = ResourceLabel::with_capacity(2 + tags.len());
            label.push("name", resource.name);
            label.push("epId", resource.ep_id);
            for (key, value) in tags {
                label.push(key, value);
            }
            info.labels.insert(resource.id, label);
        }

        info
    }
}

#[async_trait::async_trait]
impl ResourceInfoProvider for RmsResourceProvider {
    async fn get_resource_info(&self) -> Result<ResourceInfo> {
        let resources = self.list_resources().await.map_err(|e| {
            BridgeError::resource_enumeration(
                &self.namespace,
                format!(
                    "{}.{}: {}",
                    self.resource.provider, self.resource.resource_type, e
                ),
            )
        })?;

        debug!(
            namespace = %self.namespace,
            provider = %self.resource.provider,
            resource_type = %self.resource.resource_type,
            count = resources.len(),
            "Enumerated resources"
        );
        Ok(self.build_info(resources))
    }
}
