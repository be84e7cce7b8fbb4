//! Shared application state
//!
//! Built once at startup from explicitly opened data sources and cloned
//! into every handler.

use std::sync::Arc;

use crate::database::DataSource;
use crate::filters::FilterService;
use crate::hierarchy::Hierarchy;
use crate::kpi::{KpiCatalog, KpiQueryBuilder};
use crate::validator::HierarchyValidator;

#[derive(Clone)]
pub struct AppState {
    pub hierarchy: Arc<Hierarchy>,
    pub catalog: Arc<KpiCatalog>,
    pub filters: FilterService,
    pub kpi: KpiQueryBuilder,
    /// Every distinct store, pinged by the health endpoint.
    pub stores: Vec<Arc<dyn DataSource>>,
}

impl AppState {
    /// Wire the services. `geo` holds the hierarchy tables, `kpi` the
    /// metric tables; they may be the same store.
    pub fn new(
        hierarchy: Hierarchy,
        catalog: KpiCatalog,
        geo: Arc<dyn DataSource>,
        kpi: Arc<dyn DataSource>,
    ) -> Self {
        let hierarchy = Arc::new(hierarchy);
        let validator = HierarchyValidator::new(geo.clone());

        let filters = FilterService::new(
            hierarchy.clone(),
            validator.clone(),
            geo.clone(),
            kpi.clone(),
            catalog.tables(),
        );
        let kpi_builder = KpiQueryBuilder::new(hierarchy.clone(), validator, kpi.clone());

        let mut stores = vec![geo.clone()];
        if !Arc::ptr_eq(&geo, &kpi) {
            stores.push(kpi);
        }

        Self {
            hierarchy,
            catalog: Arc::new(catalog),
            filters,
            kpi: kpi_builder,
            stores,
        }
    }
}
