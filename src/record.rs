use crate::error::ParseFailure;

const FIELD_COUNT: usize = 6;

/// One postal code row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub code: i64,
    pub place_name: String,
    pub region_key: String,
    pub subregion: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Record {
    pub fn new(
        code: i64,
        place_name: &str,
        region_key: &str,
        subregion: &str,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            code,
            place_name: place_name.to_owned(),
            region_key: region_key.to_owned(),
            subregion: subregion.to_owned(),
            latitude,
            longitude,
        }
    }

    /// Builds a record from already split fields, trimming each one.
    pub fn from_fields(fields: &[String]) -> Result<Self, ParseFailure> {
        if fields.len() != FIELD_COUNT {
            return Err(ParseFailure::FieldCount { found: fields.len() });
        }

        let code_field = trim_field(&fields[0]);
        let code: i64 = code_field
            .parse()
            .map_err(|_| ParseFailure::InvalidCode(code_field.to_owned()))?;

        let latitude_field = trim_field(&fields[4]);
        let latitude = parse_coordinate(latitude_field)
            .ok_or_else(|| ParseFailure::InvalidLatitude(latitude_field.to_owned()))?;

        let longitude_field = trim_field(&fields[5]);
        let longitude = parse_coordinate(longitude_field)
            .ok_or_else(|| ParseFailure::InvalidLongitude(longitude_field.to_owned()))?;

        Ok(Self::new(
            code,
            trim_field(&fields[1]),
            trim_field(&fields[2]),
            trim_field(&fields[3]),
            latitude,
            longitude,
        ))
    }
}

#[inline]
pub(crate) fn is_field_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

#[inline]
fn trim_field(field: &str) -> &str {
    field.trim_matches(is_field_whitespace)
}

// NaN never compares, so it would pin whichever slot it lands in first.
fn parse_coordinate(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|value| value.is_finite())
}
