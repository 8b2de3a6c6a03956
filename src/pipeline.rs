use tracing::{info, instrument};

use crate::client::{Client, ClientOptions};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::merge::merge;
use crate::parser::{ParserOptions, parse};
use crate::request::ReadingsQuery;

/// Fetch, parse and merge readings for a query in one call.
///
/// ```no_run
/// use chrono::NaiveDate;
/// use ea_readings::{ClientOptions, MeasurementType, Pipeline, ReadingsQuery};
///
/// # async fn run() -> ea_readings::Result<()> {
/// let pipeline = Pipeline::new(ClientOptions::default())?;
/// let query = ReadingsQuery::new(
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
/// )
/// .stations(["E7050", "E7090"])
/// .parameter(MeasurementType::Rainfall);
///
/// let dataset = pipeline.run(&query).await?;
/// for total in dataset.totals_by_station(&MeasurementType::Rainfall) {
///     println!("{}: {:.1} mm", total.station_id, total.total);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline {
    client: Client,
    parser: ParserOptions,
}

impl Pipeline {
    pub fn new(opts: ClientOptions) -> Result<Self> {
        Ok(Self::with_client(Client::new(opts)?, ParserOptions::default()))
    }

    pub fn with_client(client: Client, parser: ParserOptions) -> Self {
        Self { client, parser }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Run the whole pipeline. The query is fetched one station and day at a
    /// time (see [`ReadingsQuery::partition`]). Any failure aborts the run; a
    /// `Dataset` is only returned when every page was fetched and parsed and
    /// at least one record survived.
    ///
    /// Cancellation is left to the caller: wrap the future in
    /// `tokio::time::timeout` and everything fetched so far is dropped with it.
    #[instrument(skip(self, query), fields(start = %query.start(), end = %query.end()))]
    pub async fn run(&self, query: &ReadingsQuery) -> Result<Dataset> {
        query.validate()?;

        let mut pages = Vec::new();
        for part in query.partition() {
            let fetched = self.client.fetch_all_from(&part, pages.len()).await?;
            pages.extend(fetched);
        }

        let mut parsed = Vec::with_capacity(pages.len());
        for page in &pages {
            parsed.push(parse(page, &self.parser)?);
        }

        let dataset = merge(parsed)?;
        info!(records = dataset.len(), stations = dataset.stations().len(), "pipeline complete");
        Ok(dataset)
    }
}
