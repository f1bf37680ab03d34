//! Column formatters
//!
//! Casts and munges inbound properties into strings consistent with the
//! configured schemas.
//!
//! There are two kinds of formatters: vanilla ones (`int`, `varchar`, ...)
//! and formatter generators, which need input from the schema to decide how
//! to parse. The quintessential generator is the timestamp family, where the
//! identifier carries the layout: `f@timestamp@unix`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::Outcome;
use crate::geoip::GeoLookup;

/// Everything is stored and emitted in Pacific time unless the schema says
/// otherwise.
pub(crate) const PACIFIC: Tz = chrono_tz::America::Los_Angeles;

/// Inclusive unix-seconds range accepted by the `unix` timestamp formatters.
/// The upper bound keeps the formatted year at four digits.
const TIME_LOWER_BOUND: f64 = 1_000_000_000.0;
const TIME_UPPER_BOUND: f64 = 13_140_000_000.0;

/// Floats with absolute magnitude below this are snapped to 0.0; the
/// warehouse and our float formatting disagree about representations this
/// small.
const FLOAT_LOWER_BOUND: f64 = 10e-300;

/// Argument slice handed to a formatter: the inbound value first, then one
/// entry per supporting column. Missing properties arrive as `None`.
pub type FormatterArgs<'a> = &'a [Option<&'a Value>];

/// A column formatter: pure function from arguments to a value and outcome.
pub type ColumnFormatter = Box<dyn Fn(FormatterArgs) -> (String, Outcome) + Send + Sync>;

/// One schema column bound to its formatter.
///
/// Performs `formatter(event[inbound], event[supporting...]) -> value` and
/// names the output column.
pub struct TypedColumn {
    pub inbound: String,
    pub outbound: String,
    pub supporting: Vec<String>,
    formatter: ColumnFormatter,
}

impl TypedColumn {
    pub fn new(
        inbound: impl Into<String>,
        outbound: impl Into<String>,
        supporting: Vec<String>,
        formatter: ColumnFormatter,
    ) -> Self {
        Self {
            inbound: inbound.into(),
            outbound: outbound.into(),
            supporting,
            formatter,
        }
    }

    /// Format this column from the decoded event properties.
    pub fn format(&self, properties: &serde_json::Map<String, Value>) -> (String, Outcome) {
        let inbound = properties.get(&self.inbound);
        if inbound.is_none() && self.supporting.is_empty() {
            return (String::new(), Outcome::Failed("property not found".into()));
        }

        let mut args: Vec<Option<&Value>> = Vec::with_capacity(1 + self.supporting.len());
        args.push(inbound);
        for col in &self.supporting {
            args.push(properties.get(col));
        }
        (self.formatter)(&args)
    }
}

impl std::fmt::Debug for TypedColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedColumn")
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .field("supporting", &self.supporting)
            .finish()
    }
}

/// Wrap a formatter so it rejects calls with the wrong argument count
/// before the inner closure ever runs.
pub(crate) fn guard_arity(
    formatter: impl Fn(FormatterArgs) -> (String, Outcome) + Send + Sync + 'static,
    nargs: usize,
) -> ColumnFormatter {
    Box::new(move |args| {
        if args.len() != nargs {
            return (
                String::new(),
                Outcome::Failed(format!(
                    "provided {} arguments instead of the required {}",
                    args.len(),
                    nargs
                )),
            );
        }
        formatter(args)
    })
}

/// Look up a single-value formatter by identifier.
///
/// Returns `None` for identifiers nobody registered; schema building turns
/// that into a configuration error.
pub fn single_value_formatter(id: &str, geo: &Arc<dyn GeoLookup>) -> Option<ColumnFormatter> {
    match id {
        "int" => Some(guard_arity(int_format(32), 1)),
        "bigint" => Some(guard_arity(int_format(64), 1)),
        "float" => Some(guard_arity(float_format, 1)),
        "varchar" => Some(guard_arity(varchar_format, 1)),
        "bool" => Some(guard_arity(bool_format, 1)),
        "ipCity" => Some(guard_arity(geo_format("Ip City", geo.clone(), GeoField::City), 1)),
        "ipCountry" => Some(guard_arity(
            geo_format("Ip Country", geo.clone(), GeoField::Country),
            1,
        )),
        "ipRegion" => Some(guard_arity(
            geo_format("Ip Region", geo.clone(), GeoField::Region),
            1,
        )),
        "ipAsn" => Some(guard_arity(geo_format("Ip Asn", geo.clone(), GeoField::Asn), 1)),
        "ipAsnInteger" => Some(guard_arity(asn_integer_format(geo.clone()), 1)),
        _ => {
            // Generated formatters are spelled f@<generator>@<parameter>.
            let mut parts = id.splitn(3, '@');
            if parts.next() != Some("f") {
                return None;
            }
            match (parts.next(), parts.next()) {
                (Some("timestamp"), Some(layout)) => {
                    Some(guard_arity(time_format(layout.to_string()), 1))
                }
                _ => None,
            }
        }
    }
}

/// Parse an alleged integer out of a decoded JSON value.
///
/// Accepts exact JSON integers and decimal strings; floats are a failure so
/// the caller can decide whether to fall back to a lookup.
pub(crate) fn parse_i64(value: Option<&Value>) -> Result<i64, Outcome> {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| Outcome::failed(n, "integer")),
        Some(Value::String(s)) => s
            .parse::<i64>()
            .map_err(|_| Outcome::failed(s, "integer")),
        other => Err(Outcome::failed(DisplayValue(other), "integer")),
    }
}

/// Displays an optional JSON value for error messages.
struct DisplayValue<'a>(Option<&'a Value>);

impl std::fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("null"),
        }
    }
}

fn int_format(bits: u32) -> impl Fn(FormatterArgs) -> (String, Outcome) {
    let max = if bits == 32 { i32::MAX as i64 } else { i64::MAX };
    let min = if bits == 32 { i32::MIN as i64 } else { i64::MIN };
    move |args| match parse_i64(args[0]) {
        Ok(i) if i >= min && i <= max => (i.to_string(), Outcome::Success),
        Ok(i) => (
            String::new(),
            Outcome::Failed(format!("value {i} out of range (bits: {bits})")),
        ),
        Err(outcome) => (String::new(), outcome),
    }
}

fn float_format(args: FormatterArgs) -> (String, Outcome) {
    let parsed = match args[0] {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| Outcome::failed(n, "float")),
        Some(Value::String(s)) => s.parse::<f64>().map_err(|_| Outcome::failed(s, "float")),
        other => Err(Outcome::failed(DisplayValue(other), "float")),
    };

    match parsed {
        Ok(f) if f.is_nan() => (String::new(), Outcome::Success),
        Ok(mut f) => {
            if f > -FLOAT_LOWER_BOUND && f < FLOAT_LOWER_BOUND {
                f = 0.0;
            }
            // Display for f64 is the shortest decimal that round-trips.
            (f.to_string(), Outcome::Success)
        }
        Err(outcome) => (String::new(), outcome),
    }
}

fn varchar_format(args: FormatterArgs) -> (String, Outcome) {
    match args[0] {
        Some(Value::String(s)) => (s.clone(), Outcome::Success),
        other => (String::new(), Outcome::failed(DisplayValue(other), "varchar")),
    }
}

fn bool_format(args: FormatterArgs) -> (String, Outcome) {
    match args[0] {
        Some(Value::Bool(b)) => (b.to_string(), Outcome::Success),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(1) => ("true".to_string(), Outcome::Success),
            Some(0) => ("false".to_string(), Outcome::Success),
            _ => (String::new(), Outcome::failed(n, "bool")),
        },
        other => (String::new(), Outcome::failed(DisplayValue(other), "bool")),
    }
}

#[derive(Clone, Copy)]
enum GeoField {
    City,
    Country,
    Region,
    Asn,
}

fn geo_format(
    name: &'static str,
    geo: Arc<dyn GeoLookup>,
    field: GeoField,
) -> impl Fn(FormatterArgs) -> (String, Outcome) {
    move |args| match args[0] {
        Some(Value::String(ip)) => {
            let resolved = match field {
                GeoField::City => geo.city(ip),
                GeoField::Country => geo.country(ip),
                GeoField::Region => geo.region(ip),
                GeoField::Asn => geo.asn(ip),
            };
            (resolved, Outcome::Success)
        }
        other => (String::new(), Outcome::failed(DisplayValue(other), name)),
    }
}

/// `ipAsnInteger`: take the resolver's "AS1234 Some Org" string and emit the
/// bare ASN number.
fn asn_integer_format(geo: Arc<dyn GeoLookup>) -> impl Fn(FormatterArgs) -> (String, Outcome) {
    move |args| {
        let ip = match args[0] {
            Some(Value::String(ip)) => ip,
            other => return (String::new(), Outcome::failed(DisplayValue(other), "Ip Asn")),
        };
        let asn = geo.asn(ip);
        let Some(rest) = asn.strip_prefix("AS") else {
            return (String::new(), Outcome::failed(&asn, "Ip Asn"));
        };
        let digits = rest.split(' ').next().unwrap_or(rest);
        match digits.parse::<u64>() {
            Ok(n) => (n.to_string(), Outcome::Success),
            Err(_) => (String::new(), Outcome::failed(&asn, "Ip Asn")),
        }
    }
}

/// Build a timestamp formatter for the given layout.
///
/// `unix` and `unix-utc` take fractional epoch seconds; anything else is a
/// strftime layout parsed in Pacific time.
fn time_format(layout: String) -> impl Fn(FormatterArgs) -> (String, Outcome) {
    move |args| match layout.as_str() {
        "unix" => unix_time(args[0], PACIFIC),
        "unix-utc" => unix_time(args[0], chrono_tz::UTC),
        layout => layout_time(args[0], layout),
    }
}

fn unix_time(value: Option<&Value>, tz: Tz) -> (String, Outcome) {
    let Some(Value::Number(n)) = value else {
        return (
            String::new(),
            Outcome::failed(DisplayValue(value), "Time: unix"),
        );
    };
    let Some(f) = n.as_f64() else {
        return (String::new(), Outcome::failed(n, "Time: unix"));
    };

    let seconds = f.trunc();
    if !(TIME_LOWER_BOUND..=TIME_UPPER_BOUND).contains(&seconds) {
        return (String::new(), Outcome::failed(n, "Time: unix"));
    }
    let nanos = ((f - seconds) * 1e9) as u32;

    match DateTime::<Utc>::from_timestamp(seconds as i64, nanos) {
        Some(dt) => (format_ingest(dt.with_timezone(&tz)), Outcome::Success),
        None => (String::new(), Outcome::failed(n, "Time: unix")),
    }
}

fn layout_time(value: Option<&Value>, layout: &str) -> (String, Outcome) {
    let Some(Value::String(s)) = value else {
        return (
            String::new(),
            Outcome::failed(DisplayValue(value), &format!("Time: {layout}")),
        );
    };

    let naive = NaiveDateTime::parse_from_str(s, layout)
        .or_else(|_| NaiveDate::parse_from_str(s, layout).map(|d| d.and_time(NaiveTime::MIN)));

    match naive {
        Ok(naive) => match PACIFIC.from_local_datetime(&naive).earliest() {
            Some(dt) => (format_ingest(dt), Outcome::Success),
            None => (
                String::new(),
                Outcome::Failed(format!("{s} does not exist in Pacific time")),
            ),
        },
        Err(e) => (String::new(), Outcome::Failed(format!("Time: {layout}: {e}"))),
    }
}

/// Warehouse ingest format: `YYYY-MM-DD HH:MM:SS.fff`, millisecond
/// precision, trailing zeros (and a bare dot) trimmed.
pub(crate) fn format_ingest<T: TimeZone>(dt: DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    let mut out = dt.format("%Y-%m-%d %H:%M:%S").to_string();
    let millis = dt.timestamp_subsec_millis();
    if millis > 0 {
        let frac = format!("{millis:03}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out
}

/// Build a bound column from its schema spec.
///
/// Mapping formatters take precedence (they need the cache/fetcher context);
/// everything else resolves through the single-value table.
pub fn build_column(
    spec: &hopper_protocol::ColumnSpec,
    geo: &Arc<dyn GeoLookup>,
    mapping: Option<&crate::mapping::MappingConfig>,
) -> Result<TypedColumn, crate::error::TransformError> {
    let formatter = match mapping.and_then(|m| crate::mapping::mapping_formatter(&spec.formatter, m)) {
        Some(f) => f,
        None => single_value_formatter(&spec.formatter, geo)
            .ok_or_else(|| crate::error::TransformError::UnknownFormatter(spec.formatter.clone()))?,
    };

    let outbound = if spec.outbound_name.is_empty() {
        spec.inbound_name.clone()
    } else {
        spec.outbound_name.clone()
    };

    Ok(TypedColumn::new(
        spec.inbound_name.clone(),
        outbound,
        spec.supporting_columns.clone(),
        formatter,
    ))
}
