/// Unique sample identifier (stable across runs).
/// Example: `Dota_2::76561198030000000::4`
pub type SampleId = String;
/// Identifier for a group of samples in the corpus (one game per group).
/// Examples: `Dota_2`, `Arma_3`, `Team_Fortress_2`
pub type GroupId = String;
/// Identifier for the corpus store backing a partition run.
/// Examples: `reviews`, `reviews.jsonl`
pub type CorpusId = String;
/// Name of a dataset built from folds, used in logs and errors.
/// Examples: `training`, `grid_search`
pub type DatasetName = String;
