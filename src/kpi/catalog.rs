//! KPI metric catalog
//!
//! The fixed allow-list of metrics the dashboard may query. A request only
//! ever picks an entry by slug; table and column names come from here.

use serde::Serialize;

use crate::database::Ident;

/// Column holding the time dimension in every KPI table.
pub const YEAR_COLUMN: Ident = Ident::new("Year");

/// How the rows of a metric are presented to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Rows are returned as projected.
    Raw,
    /// `{label: "<period> <year>", value}` per row.
    PeriodSeries { period: Ident, value: Ident },
    /// `{label: <category>, value}` per row.
    CategorySeries { category: Ident, value: Ident },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::PeriodSeries { .. } => "period-series",
            Self::CategorySeries { .. } => "category-series",
        }
    }
}

/// Minimum geographic filter a metric demands before it may be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorPolicy {
    /// No geographic filter needed.
    None,
    /// The root level ID (e.g. `circleId`).
    Root,
    /// The leaf level ID (e.g. `sectionId`).
    Leaf,
    /// Either the root or the leaf level ID.
    RootOrLeaf,
}

#[derive(Debug, Clone)]
pub struct KpiDefinition {
    pub slug: &'static str,
    pub title: &'static str,
    pub table: Ident,
    pub columns: Vec<Ident>,
    pub order_by: Option<Ident>,
    pub shape: Shape,
    pub anchor: AnchorPolicy,
}

/// Summary row for `GET /api/kpi`.
#[derive(Debug, Clone, Serialize)]
pub struct KpiSummary {
    pub slug: &'static str,
    pub title: &'static str,
    pub table: &'static str,
    pub shape: &'static str,
}

impl From<&KpiDefinition> for KpiSummary {
    fn from(def: &KpiDefinition) -> Self {
        Self {
            slug: def.slug,
            title: def.title,
            table: def.table.as_str(),
            shape: def.shape.name(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KpiCatalog {
    metrics: Vec<KpiDefinition>,
}

fn monthly(
    slug: &'static str,
    title: &'static str,
    table: &'static str,
    value: &'static str,
) -> KpiDefinition {
    let period = Ident::new("Month");
    let value = Ident::new(value);
    KpiDefinition {
        slug,
        title,
        table: Ident::new(table),
        columns: vec![period, YEAR_COLUMN, value],
        order_by: Some(Ident::new("MonthNo")),
        shape: Shape::PeriodSeries { period, value },
        anchor: AnchorPolicy::RootOrLeaf,
    }
}

impl KpiCatalog {
    pub fn new(metrics: Vec<KpiDefinition>) -> Self {
        Self { metrics }
    }

    /// The metrics served by the dashboard.
    pub fn standard() -> Self {
        let category = Ident::new("ConsumerCategory");
        let sales = Ident::new("SalesMU");

        Self::new(vec![
            monthly(
                "billing-efficiency",
                "Billing Efficiency (%)",
                "kpi_billing_efficiency",
                "BillingEfficiency",
            ),
            monthly(
                "collection-efficiency",
                "Collection Efficiency (%)",
                "kpi_collection_efficiency",
                "CollectionEfficiency",
            ),
            monthly("atc-losses", "AT&C Losses (%)", "kpi_atc_losses", "ATCLossPercent"),
            monthly(
                "distribution-losses",
                "Distribution Losses (%)",
                "kpi_distribution_losses",
                "DistributionLossPercent",
            ),
            monthly("outages", "Outages", "kpi_outages", "OutageCount"),
            KpiDefinition {
                slug: "consumer-sales",
                title: "Sales by Consumer Category (MU)",
                table: Ident::new("kpi_consumer_sales"),
                columns: vec![category, sales],
                order_by: Some(category),
                shape: Shape::CategorySeries {
                    category,
                    value: sales,
                },
                anchor: AnchorPolicy::RootOrLeaf,
            },
            KpiDefinition {
                slug: "arrears",
                title: "Arrears",
                table: Ident::new("kpi_arrears"),
                columns: vec![
                    YEAR_COLUMN,
                    Ident::new("ConsumerCount"),
                    Ident::new("ArrearsAmount"),
                    Ident::new("ArrearsAbove90Days"),
                ],
                order_by: None,
                shape: Shape::Raw,
                anchor: AnchorPolicy::Root,
            },
            KpiDefinition {
                slug: "transformer-failures",
                title: "Distribution Transformer Failures",
                table: Ident::new("kpi_transformer_failures"),
                columns: vec![
                    YEAR_COLUMN,
                    Ident::new("InstalledCount"),
                    Ident::new("FailedCount"),
                    Ident::new("FailureRatePercent"),
                ],
                order_by: None,
                shape: Shape::Raw,
                anchor: AnchorPolicy::Root,
            },
        ])
    }

    pub fn get(&self, slug: &str) -> Option<&KpiDefinition> {
        self.metrics.iter().find(|m| m.slug == slug)
    }

    pub fn metrics(&self) -> &[KpiDefinition] {
        &self.metrics
    }

    /// Distinct KPI tables, in catalog order.
    pub fn tables(&self) -> Vec<Ident> {
        let mut tables: Vec<Ident> = Vec::new();
        for metric in &self.metrics {
            if !tables.contains(&metric.table) {
                tables.push(metric.table);
            }
        }
        tables
    }

    pub fn summaries(&self) -> Vec<KpiSummary> {
        self.metrics.iter().map(KpiSummary::from).collect()
    }
}

impl Default for KpiCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
