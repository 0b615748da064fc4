//! [Octopus Energy](https://developer.octopus.energy/rest/) REST client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    api::{Page, Provider, client, provider::span},
    db::{ConsumptionInterval, RateInterval, StandingCharge},
    prelude::*,
    quantity::{energy::KilowattHours, rate::KilowattHourRate},
};

pub const DEFAULT_BASE_URL: &str = "https://api.octopus.energy/v1/";

/// Electricity meter that the consumption is read from.
#[derive(Clone, Debug)]
pub struct MeterPoint {
    pub mpan: String,
    pub serial_number: String,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum PaymentMethod {
    #[default]
    DirectDebit,
    NonDirectDebit,
}

impl PaymentMethod {
    const fn as_wire(self) -> &'static str {
        match self {
            Self::DirectDebit => "DIRECT_DEBIT",
            Self::NonDirectDebit => "NON_DIRECT_DEBIT",
        }
    }

    /// Records without a payment method apply to everyone.
    fn accepts(self, payment_method: Option<&str>) -> bool {
        payment_method.is_none_or(|payment_method| payment_method == self.as_wire())
    }
}

pub struct Api {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    meter_point: Option<MeterPoint>,
    payment_method: PaymentMethod,
}

#[bon::bon]
impl Api {
    #[builder]
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        meter_point: Option<MeterPoint>,
        #[builder(default)] payment_method: PaymentMethod,
    ) -> Result<Self> {
        Ok(Self { client: client::try_new()?, base_url, api_key, meter_point, payment_method })
    }
}

impl Api {
    #[instrument(skip_all, fields(path = path, page = page))]
    async fn get_page<T: DeserializeOwned>(&self, path: &str, page: u32) -> Result<WirePage<T>> {
        let url = self
            .base_url
            .join(path)
            .map_err(|_| Error::InvalidUrl { url: format!("{}{path}", self.base_url) })?;
        debug!(%url, "fetching…");
        let mut request = self.client.get(url).query(&[("page", page)]);
        if let Some(api_key) = &self.api_key {
            request = request.basic_auth(api_key, Some(""));
        }
        let body = request.send().await?.error_for_status()?.bytes().await?;
        let page = decode_page::<T>(&body)?;
        debug!(page.count, n_results = page.results.len(), "fetched");
        Ok(page)
    }
}

#[async_trait]
impl Provider for Api {
    async fn unit_rates(&self, tariff_code: &str, page: u32) -> Result<Page<RateInterval>> {
        let path = format!(
            "products/{}/electricity-tariffs/{tariff_code}/standard-unit-rates/",
            product_code(tariff_code),
        );
        let page = self.get_page::<WireCharge>(&path, page).await?;
        Ok(page.filter_map(|charge| {
            self.payment_method.accepts(charge.payment_method.as_deref()).then(|| RateInterval {
                tariff_code: tariff_code.to_owned(),
                valid_from: charge.valid_from,
                valid_to: charge.valid_to,
                value_excl_tax: KilowattHourRate::from(charge.value_exc_vat),
                value_incl_tax: KilowattHourRate::from(charge.value_inc_vat),
            })
        }))
    }

    async fn standing_charges(&self, tariff_code: &str, page: u32) -> Result<Page<StandingCharge>> {
        let path = format!(
            "products/{}/electricity-tariffs/{tariff_code}/standing-charges/",
            product_code(tariff_code),
        );
        let page = self.get_page::<WireCharge>(&path, page).await?;
        Ok(page.filter_map(|charge| {
            self.payment_method.accepts(charge.payment_method.as_deref()).then(|| StandingCharge {
                tariff_code: tariff_code.to_owned(),
                valid_from: charge.valid_from,
                valid_to: charge.valid_to,
                value_excl_tax: charge.value_exc_vat.into(),
                value_incl_tax: charge.value_inc_vat.into(),
            })
        }))
    }

    async fn consumption(&self, page: u32) -> Result<Page<ConsumptionInterval>> {
        let Some(meter_point) = &self.meter_point else {
            warn!("no meter point configured, consumption is unavailable");
            return Ok(Page::empty());
        };
        let path = format!(
            "electricity-meter-points/{}/meters/{}/consumption/",
            meter_point.mpan, meter_point.serial_number,
        );
        let page = self.get_page::<WireConsumption>(&path, page).await?;
        Ok(page.filter_map(|reading| {
            Some(ConsumptionInterval {
                interval_start: reading.interval_start,
                interval_end: reading.interval_end,
                consumption: KilowattHours::from(reading.consumption),
            })
        }))
    }
}

/// Product code embedded in a tariff code, for example `AGILE-24-10-01` in `E-1R-AGILE-24-10-01-C`.
#[must_use]
pub fn product_code(tariff_code: &str) -> String {
    let parts: Vec<&str> = tariff_code.split('-').collect();
    if parts.len() > 3 { parts[2..parts.len() - 1].join("-") } else { tariff_code.to_owned() }
}

fn decode_page<T: DeserializeOwned>(body: &[u8]) -> Result<WirePage<T>> {
    serde_json::from_slice(body).map_err(Error::Decode)
}

#[derive(Deserialize)]
struct WirePage<T> {
    count: usize,
    next: Option<String>,
    previous: Option<String>,
    results: Vec<T>,
}

impl<T: WireRecord> WirePage<T> {
    /// Convert the records, keeping the page geometry of the records as served.
    fn filter_map<R>(self, f: impl FnMut(T) -> Option<R>) -> Page<R> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            page_size: self.results.len(),
            span: span(self.results.iter().map(WireRecord::start)),
            results: self.results.into_iter().filter_map(f).collect(),
        }
    }
}

trait WireRecord {
    fn start(&self) -> DateTime<Utc>;
}

#[derive(Deserialize)]
struct WireCharge {
    value_exc_vat: f64,
    value_inc_vat: f64,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,

    #[serde(default)]
    payment_method: Option<String>,
}

impl WireRecord for WireCharge {
    fn start(&self) -> DateTime<Utc> {
        self.valid_from
    }
}

#[derive(Deserialize)]
struct WireConsumption {
    consumption: f64,
    interval_start: DateTime<Utc>,
    interval_end: DateTime<Utc>,
}

impl WireRecord for WireConsumption {
    fn start(&self) -> DateTime<Utc> {
        self.interval_start
    }
}
