//! Data models for the mirrored datasets.

mod kolada;
mod publication;

pub use kolada::{
    KoladaSnapshot, KpiDataResponse, KpiMeasurement, KpiPeriod, KpiValue, MunicipalityStats,
};
pub use publication::{
    publication_type_label, slug_from_url, Attachment, Decision, Index, PressRelease, Publication,
    StatisticsFile, DEFAULT_PUBLICATION_TYPE, PUBLICATION_TYPES,
};
