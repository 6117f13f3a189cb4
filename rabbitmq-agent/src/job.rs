//! One polling cycle
//!
//! Overview, then vhosts with their connections, then queues, strictly in
//! sequence. Whatever cannot be fetched is skipped for this cycle only.

use tracing::{debug, info};

use crate::api::{Endpoint, ManagementClient};
use crate::config::AgentConfig;
use crate::delivery::ItemQueue;
use crate::discovery::{queue_discovery, vhost_discovery, DiscoveryCategory};
use crate::error::Result;
use crate::items::{DeliverableItem, ItemFormatter};
use crate::metrics::{ConnectionHistogram, MetricExtractor, MetricSample};
use crate::model::{decode_records, BrokerOverview, ConnectionRecord, QueueRecord, VhostRecord};

/// What one cycle managed to gather
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub enqueued: usize,
    pub overview: bool,
    pub vhosts: bool,
    pub connections: bool,
    pub queues: bool,
}

pub struct RabbitmqJob {
    client: ManagementClient,
    extractor: MetricExtractor,
    formatter: ItemFormatter,
    queue: ItemQueue,
}

impl RabbitmqJob {
    pub fn new(config: &AgentConfig, queue: ItemQueue) -> Result<Self> {
        Ok(Self {
            client: ManagementClient::new(&config.api)?,
            extractor: MetricExtractor::new(config.hostname.clone()),
            formatter: ItemFormatter::new(config.hostname.clone()),
            queue,
        })
    }

    /// Run a full cycle. Never fails: every problem is logged and skipped.
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        self.enqueue_samples(self.extractor.agent_metrics(), &mut summary);
        self.overview_stat(&mut summary).await;
        self.vhost_stat(&mut summary).await;
        self.queue_stat(&mut summary).await;

        info!(
            "Enqueued RabbitmqValue: {} items (overview: {}, vhosts: {}, connections: {}, queues: {})",
            summary.enqueued, summary.overview, summary.vhosts, summary.connections, summary.queues
        );
        summary
    }

    async fn overview_stat(&self, summary: &mut PollSummary) {
        let Some(document) = self.client.fetch(Endpoint::Overview).await else {
            return;
        };
        let overview = match serde_json::from_value::<BrokerOverview>(document) {
            Ok(overview) => overview,
            Err(e) => {
                debug!("Unreadable overview, using defaults: {}", e);
                BrokerOverview::default()
            }
        };
        summary.overview = true;
        self.enqueue_samples(self.extractor.overview_metrics(&overview), summary);
    }

    async fn vhost_stat(&self, summary: &mut PollSummary) {
        let Some(document) = self.client.fetch(Endpoint::Vhosts).await else {
            return;
        };
        summary.vhosts = true;
        let vhosts: Vec<VhostRecord> = decode_records("vhost", document);

        let histogram = self.vhost_connections(summary).await;

        if vhosts.is_empty() {
            debug!("no vhost found");
            return;
        }

        self.enqueue_samples(self.extractor.extract_vhost_metrics(&vhosts, &histogram), summary);

        let entries = vhost_discovery(&vhosts);
        if let Some(item) = self.formatter.format_discovery(DiscoveryCategory::Vhost, &entries) {
            self.enqueue(item, summary);
        }
    }

    async fn vhost_connections(&self, summary: &mut PollSummary) -> ConnectionHistogram {
        match self.client.fetch(Endpoint::Connections).await {
            Some(document) => {
                summary.connections = true;
                let connections: Vec<ConnectionRecord> = decode_records("connection", document);
                ConnectionHistogram::aggregate(&connections)
            }
            None => ConnectionHistogram::default(),
        }
    }

    async fn queue_stat(&self, summary: &mut PollSummary) {
        let Some(document) = self.client.fetch(Endpoint::Queues).await else {
            return;
        };
        summary.queues = true;
        let queues: Vec<QueueRecord> = decode_records("queue", document);

        if queues.is_empty() {
            debug!("no message queues found");
            return;
        }

        self.enqueue_samples(self.extractor.extract_queue_metrics(&queues), summary);

        let entries = queue_discovery(&queues);
        if let Some(item) = self.formatter.format_discovery(DiscoveryCategory::Queue, &entries) {
            self.enqueue(item, summary);
        }
    }

    fn enqueue_samples(&self, samples: Vec<MetricSample>, summary: &mut PollSummary) {
        for sample in &samples {
            self.enqueue(self.formatter.format_metric(sample), summary);
        }
    }

    fn enqueue(&self, item: DeliverableItem, summary: &mut PollSummary) {
        let key = item.key.clone();
        if self.queue.put(item) {
            summary.enqueued += 1;
            debug!("Inserted to queue {}", key);
        }
    }
}
