//! Analytics service
//!
//! One read entry point per dashboard view. Filters arrive validated (see
//! [`ViewFilter`]); "now"-relative views take an explicit `as_of` so repeated
//! calls over unchanged data return identical results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::aggregation::graph::{self, DependencyNode, UpgradeComposition};
use crate::aggregation::leaderboard::{self, LeaderboardRow, LeaderboardSort};
use crate::aggregation::trend::{self, ActivityPoint, MonthPoint, ThroughputPoint};
use crate::aggregation::velocity::{self, OutcomeRow, ResponseSummary, VelocityRow};
use crate::aggregation::*;
use crate::config::loader;
use crate::config::AppConfig;
use crate::database::models::*;
use crate::database::queries::{EventStore, StreamEvent, StreamKind};
use crate::database::Database;
use crate::error::InsightsError;
use crate::filters::{DateWindow, ViewFilter};
use crate::ledger::consistency::{self, ConsistencyReport};
use crate::ledger::EventLog;
use crate::scoring::bottleneck::{self, BottleneckClassifier, BottleneckRow, CategoryCount};
use crate::scoring::trending::{self, TrendingRow};
use crate::scoring::waiting::{self, WaitingHeatmap, WaitingRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalOverview {
    pub proposal: Proposal,
    pub snapshot: Option<ProposalSnapshot>,
    pub status_events: Vec<StatusEvent>,
    pub category_events: Vec<CategoryEvent>,
    pub deadline_events: Vec<DeadlineEvent>,
    pub pull_requests: Vec<PullRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceDashboard {
    pub as_of: DateTime<Utc>,
    pub funnel: Vec<FunnelStage>,
    pub status_snapshot: Vec<StatusSnapshotRow>,
    pub trending: Vec<TrendingRow>,
    pub bottlenecks: Vec<CategoryCount>,
    pub waiting: WaitingHeatmap,
    pub velocity: Vec<VelocityRow>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: EventStore,
    config: AppConfig,
    classifier: BottleneckClassifier,
}

impl AnalyticsService {
    pub fn new(store: EventStore, config: AppConfig, classifier: BottleneckClassifier) -> Self {
        Self {
            store,
            config,
            classifier,
        }
    }

    /// Build from configuration, loading the bottleneck rule file if one is set.
    pub fn from_config(db: &Database, config: AppConfig) -> Result<Self, InsightsError> {
        let classifier = loader::load_classifier(config.bottleneck_rules_path.as_deref())?;
        Ok(Self::new(db.store(), config, classifier))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // Proposal detail

    /// Status history, oldest first. Empty for an unknown proposal.
    pub async fn status_events(&self, key: ProposalKey) -> Result<Vec<StatusEvent>, InsightsError> {
        self.store.list_status_events(key).await
    }

    pub async fn events_in_window(
        &self,
        kind: StreamKind,
        filter: &ViewFilter,
    ) -> Result<Vec<StreamEvent>, InsightsError> {
        filter.ensure_unsorted("events in window")?;
        let events = self
            .store
            .list_events_in_window(kind, &filter.window, filter.repo)
            .await?;
        debug!("{:?} events in window: {}", kind, events.len());
        Ok(events)
    }

    pub async fn proposal_overview(&self, key: ProposalKey) -> Result<ProposalOverview, InsightsError> {
        let proposal = self
            .store
            .get_proposal(key)
            .await?
            .ok_or_else(|| InsightsError::not_found("proposal", key))?;

        let (snapshot, status_events, category_events, deadline_events, pull_requests) = tokio::try_join!(
            self.store.get_snapshot(key),
            self.store.list_status_events(key),
            self.store.list_category_events(key),
            self.store.list_deadline_events(key),
            self.store.list_pull_requests_for_proposal(key),
        )?;

        Ok(ProposalOverview {
            proposal,
            snapshot,
            status_events,
            category_events,
            deadline_events,
            pull_requests,
        })
    }

    /// All three event streams of one proposal merged in time order.
    pub async fn proposal_timeline(&self, key: ProposalKey) -> Result<Vec<StreamEvent>, InsightsError> {
        let overview = self.proposal_overview(key).await?;
        let mut timeline: Vec<StreamEvent> = overview
            .status_events
            .into_iter()
            .map(StreamEvent::Status)
            .chain(overview.category_events.into_iter().map(StreamEvent::Category))
            .chain(overview.deadline_events.into_iter().map(StreamEvent::Deadline))
            .collect();
        timeline.sort_by_key(|e| e.changed_at());
        Ok(timeline)
    }

    // Status counts

    pub async fn funnel(&self, filter: &ViewFilter) -> Result<Vec<FunnelStage>, InsightsError> {
        filter.ensure_unsorted("funnel")?;
        let snapshots = self.store.list_snapshots(filter.repo).await?;
        info!("funnel over {} proposals (repo={:?})", snapshots.len(), filter.repo);
        Ok(lifecycle_funnel(&snapshots))
    }

    /// Current counts with the month-over-month delta for the month of `as_of`.
    pub async fn status_snapshot(
        &self,
        filter: &ViewFilter,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<StatusSnapshotRow>, InsightsError> {
        filter.ensure_unsorted("status snapshot")?;
        let month = MonthKey::of(as_of);
        let window = DateWindow::new(Some(month.start()), Some(month.end()))?;
        let (snapshots, events) = tokio::try_join!(
            self.store.list_snapshots(filter.repo),
            self.store.list_status_events_in_window(&window, filter.repo),
        )?;
        info!("status snapshot for {} (repo={:?})", month, filter.repo);
        Ok(status_snapshot(&snapshots, &events, month))
    }

    pub async fn category_status_matrix(&self, filter: &ViewFilter) -> Result<CrossTab, InsightsError> {
        filter.ensure_unsorted("category status matrix")?;
        let snapshots = self.store.list_snapshots(filter.repo).await?;
        Ok(category_status_matrix(&snapshots))
    }

    /// Funnel of statuses reconstructed from the log as of `as_of`.
    pub async fn status_counts_as_of(
        &self,
        filter: &ViewFilter,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<FunnelStage>, InsightsError> {
        filter.ensure_unsorted("status counts as of")?;
        let window = DateWindow::new(None, Some(as_of))?;
        let events = self
            .store
            .list_status_events_in_window(&window, filter.repo)
            .await?;
        let state = EventLog::from_events(events)?.replay(Some(as_of));
        Ok(funnel_of(state.iter().map(|(_, status)| status.as_str())))
    }

    // Durations

    pub async fn decision_velocity(&self, filter: &ViewFilter) -> Result<Vec<VelocityRow>, InsightsError> {
        filter.ensure_unsorted("decision velocity")?;
        // Pairing needs whole histories; the window applies to completion time.
        let unbounded = DateWindow::unbounded();
        let (events, proposals) = tokio::try_join!(
            self.store
                .list_status_events_in_window(&unbounded, filter.repo),
            self.store.list_proposals(filter.repo),
        )?;
        let histories = velocity::histories(&events, &proposals);
        info!(
            "decision velocity over {} proposals, {} pairs",
            histories.len(),
            self.config.velocity_pairs.len()
        );
        Ok(velocity::decision_velocity(
            &histories,
            &self.config.velocity_pairs,
            &filter.window,
        ))
    }

    /// Time to merge or close for pull requests opened inside the window.
    pub async fn time_to_decision(&self, filter: &ViewFilter) -> Result<Vec<OutcomeRow>, InsightsError> {
        filter.ensure_unsorted("time to decision")?;
        let prs = self.pull_requests_opened_in(filter).await?;
        Ok(velocity::time_to_decision(&prs))
    }

    pub async fn median_response(&self, filter: &ViewFilter) -> Result<ResponseSummary, InsightsError> {
        filter.ensure_unsorted("median response")?;
        let since = DateWindow::new(filter.window.from, None)?;
        let (prs, activity) = tokio::try_join!(
            self.pull_requests_opened_in(filter),
            self.store.list_activity(&since, filter.repo),
        )?;
        Ok(velocity::median_response_days(&prs, &activity, filter.repo))
    }

    async fn pull_requests_opened_in(&self, filter: &ViewFilter) -> Result<Vec<PullRequest>, InsightsError> {
        let prs = self.store.list_pull_requests(filter.repo, None).await?;
        Ok(prs
            .into_iter()
            .filter(|pr| filter.window.contains(pr.created_at))
            .collect())
    }

    // Trends

    pub async fn momentum(&self, filter: &ViewFilter, range: MonthRange) -> Result<Vec<MonthPoint>, InsightsError> {
        filter.ensure_unsorted("momentum")?;
        let window = DateWindow::new(Some(range.start()), Some(range.end()))?;
        let events = self
            .store
            .list_status_events_in_window(&window, filter.repo)
            .await?;
        Ok(trend::momentum(&events, &range))
    }

    pub async fn monthly_throughput(
        &self,
        filter: &ViewFilter,
        range: MonthRange,
    ) -> Result<Vec<ThroughputPoint>, InsightsError> {
        filter.ensure_unsorted("monthly throughput")?;
        let prs = self.store.list_pull_requests(filter.repo, None).await?;
        Ok(trend::monthly_throughput(&prs, &range))
    }

    pub async fn activity_timeline(
        &self,
        filter: &ViewFilter,
        range: MonthRange,
    ) -> Result<Vec<ActivityPoint>, InsightsError> {
        filter.ensure_unsorted("activity timeline")?;
        let window = DateWindow::new(Some(range.start()), Some(range.end()))?;
        let activity = self.store.list_activity(&window, filter.repo).await?;
        Ok(trend::activity_timeline(&activity, &range))
    }

    // Rankings and scores

    pub async fn leaderboard(
        &self,
        filter: &ViewFilter,
        role: Option<ContributorRole>,
    ) -> Result<Vec<LeaderboardRow>, InsightsError> {
        let sort = filter.sort_column::<LeaderboardSort>()?.unwrap_or_default();
        let activity = self.store.list_activity(&filter.window, filter.repo).await?;
        info!("leaderboard over {} activity rows (sort={:?})", activity.len(), sort);
        Ok(leaderboard::contributor_leaderboard(
            &activity,
            role,
            sort,
            filter.sort_dir,
            filter.limit_or(self.config.view_limits.leaderboard),
        ))
    }

    /// Trending proposals over the configured window ending at `as_of`.
    pub async fn trending(&self, filter: &ViewFilter, as_of: DateTime<Utc>) -> Result<Vec<TrendingRow>, InsightsError> {
        filter.ensure_unsorted("trending")?;
        let window = DateWindow::trailing_days(as_of, self.config.trending_window_days);
        let (links, activity, events, proposals) = tokio::try_join!(
            self.store.list_pull_request_links(filter.repo),
            self.store.list_activity(&window, None),
            self.store.list_status_events_in_window(&window, filter.repo),
            self.store.list_proposals(filter.repo),
        )?;

        let titles: BTreeMap<ProposalKey, String> =
            proposals.into_iter().map(|p| (p.key, p.title)).collect();
        let mut rows = trending::trending_scores(
            &links,
            &activity,
            &events,
            &window,
            filter.limit_or(self.config.view_limits.trending),
        );
        for row in &mut rows {
            row.title = titles.get(&row.key).cloned();
        }
        info!("{} trending proposals as of {}", rows.len(), as_of);
        Ok(rows)
    }

    pub async fn bottlenecks(&self, filter: &ViewFilter) -> Result<Vec<BottleneckRow>, InsightsError> {
        filter.ensure_unsorted("bottlenecks")?;
        let mut rows = self.classified_open_prs(filter).await?;
        rows.truncate(filter.limit_or(self.config.view_limits.bottlenecks));
        Ok(rows)
    }

    pub async fn bottleneck_breakdown(&self, filter: &ViewFilter) -> Result<Vec<CategoryCount>, InsightsError> {
        filter.ensure_unsorted("bottleneck breakdown")?;
        let rows = self.classified_open_prs(filter).await?;
        Ok(bottleneck::bottleneck_breakdown(&rows))
    }

    async fn classified_open_prs(&self, filter: &ViewFilter) -> Result<Vec<BottleneckRow>, InsightsError> {
        let prs = self.store.list_pull_requests(filter.repo, Some(PrState::Open)).await?;
        Ok(bottleneck::classify_open(&prs, &self.classifier))
    }

    pub async fn waiting(&self, filter: &ViewFilter, as_of: DateTime<Utc>) -> Result<Vec<WaitingRow>, InsightsError> {
        filter.ensure_unsorted("waiting")?;
        let states = self.open_governance_states(filter).await?;
        let mut rows = waiting::bucket_waiting(&states, as_of);
        rows.truncate(filter.limit_or(self.config.view_limits.timeline));
        Ok(rows)
    }

    pub async fn waiting_heatmap(&self, filter: &ViewFilter, as_of: DateTime<Utc>) -> Result<WaitingHeatmap, InsightsError> {
        filter.ensure_unsorted("waiting heatmap")?;
        let states = self.open_governance_states(filter).await?;
        Ok(waiting::waiting_heatmap(&waiting::bucket_waiting(&states, as_of)))
    }

    /// State rows left behind by merged or closed pull requests are skipped.
    async fn open_governance_states(&self, filter: &ViewFilter) -> Result<Vec<GovernanceStateRow>, InsightsError> {
        let (states, open) = tokio::try_join!(
            self.store.list_governance_states(filter.repo),
            self.store.list_pull_requests(filter.repo, Some(PrState::Open)),
        )?;
        let open: BTreeSet<(Repository, i64)> = open.iter().map(|pr| (pr.repo, pr.number)).collect();
        let total = states.len();
        let states: Vec<GovernanceStateRow> = states
            .into_iter()
            .filter(|row| open.contains(&(row.repo, row.pr_number)))
            .collect();
        if states.len() < total {
            debug!("skipped {} governance states of closed pull requests", total - states.len());
        }
        Ok(states)
    }

    // Upgrades and dependencies

    /// Composition of an upgrade, from the current table or, with `as_of`,
    /// replayed from the composition log.
    pub async fn upgrade_composition(
        &self,
        slug: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<UpgradeComposition, InsightsError> {
        let upgrade = self
            .store
            .get_upgrade_by_slug(slug)
            .await?
            .ok_or_else(|| InsightsError::not_found("upgrade", slug))?;

        let entries = match as_of {
            Some(as_of) => {
                let events = self.store.list_composition_events(upgrade.id, Some(as_of)).await?;
                let state = EventLog::from_events(events)?.replay(Some(as_of));
                graph::replayed_entries(&upgrade, &state)
            }
            None => self
                .store
                .list_composition_current(Some(upgrade.id))
                .await?
                .into_iter()
                .map(|entry| (entry.proposal, entry.bucket))
                .collect(),
        };
        Ok(graph::composition_buckets(&upgrade, entries))
    }

    pub async fn dependency_graph(&self, filter: &ViewFilter) -> Result<Vec<DependencyNode>, InsightsError> {
        filter.ensure_unsorted("dependency graph")?;
        let proposals = self.store.list_proposals(filter.repo).await?;
        Ok(graph::dependency_graph(&proposals))
    }

    // Integrity

    /// Replay every log and compare it with the materialized tables.
    pub async fn consistency_report(&self) -> Result<ConsistencyReport, InsightsError> {
        let (snapshots, status_events, current, composition_events) = tokio::try_join!(
            self.store.list_snapshots(None),
            self.store.list_status_events_as_written(),
            self.store.list_composition_current(None),
            self.store.list_composition_events_as_written(),
        )?;

        let (status_log, late_status) = EventLog::from_written(status_events);
        let (composition_log, late_composition) = EventLog::from_written(composition_events);
        let report = consistency::check_snapshots(&snapshots, &status_log)
            .merge(consistency::check_composition(&current, &composition_log))
            .merge(consistency::check_order(&late_status))
            .merge(consistency::check_order(&late_composition));
        info!(
            "consistency check: {} rows, {} violations",
            report.checked,
            report.violations.len()
        );
        Ok(report)
    }

    // Combined views

    /// Dashboard sub-views run concurrently; any failure fails the whole view.
    pub async fn governance_dashboard(
        &self,
        filter: &ViewFilter,
        as_of: DateTime<Utc>,
    ) -> Result<GovernanceDashboard, InsightsError> {
        filter.ensure_unsorted("governance dashboard")?;
        let (funnel, status_snapshot, trending, bottlenecks, waiting, velocity) = tokio::try_join!(
            self.funnel(filter),
            self.status_snapshot(filter, as_of),
            self.trending(filter, as_of),
            self.bottleneck_breakdown(filter),
            self.waiting_heatmap(filter, as_of),
            self.decision_velocity(filter),
        )?;
        Ok(GovernanceDashboard {
            as_of,
            funnel,
            status_snapshot,
            trending,
            bottlenecks,
            waiting,
            velocity,
        })
    }
}
