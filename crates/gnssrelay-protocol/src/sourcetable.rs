//! NTRIP sourcetables: parsing, nearest-mountpoint search and rendering.
//!
//! Stream rows look like
//!
//! ```text
//! STR;MP;Identifier;RTCM 3.2;1005(1),1077(1);2;GPS+GLO;NET;USA;37.23;-115.81;0;0;...
//! ```
//!
//! The leading `STR` is optional, rows without any `;` are split on `,`, and
//! `CAS`/`NET` rows, blank lines and `ENDSOURCETABLE` are skipped.

use serde::Serialize;

use gnssrelay_core::geo::haversine;

/// One mountpoint row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTableEntry {
    pub name: String,
    pub identifier: String,
    pub format: String,
    pub format_details: String,
    pub carrier: String,
    pub nav_system: String,
    pub network: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Fields after longitude, verbatim.
    pub extra: Vec<String>,
}

impl SourceTableEntry {
    /// Build from the fields following `STR`. Missing fields are left empty.
    pub fn from_fields(fields: &[&str]) -> Option<Self> {
        let field = |i: usize| fields.get(i).map(|f| f.trim().to_string()).unwrap_or_default();
        let coordinate = |i: usize| fields.get(i).and_then(|f| f.trim().parse::<f64>().ok());

        let name = field(0);
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            identifier: field(1),
            format: field(2),
            format_details: field(3),
            carrier: field(4),
            nav_system: field(5),
            network: field(6),
            country: field(7),
            latitude: coordinate(8),
            longitude: coordinate(9),
            extra: fields
                .iter()
                .skip(10)
                .map(|f| f.trim().to_string())
                .collect(),
        })
    }

    /// Render as a `STR;` row without line terminator.
    pub fn to_row(&self) -> String {
        let coordinate = |c: Option<f64>| c.map(|v| format!("{v:.2}")).unwrap_or_default();
        let mut fields = vec![
            "STR".to_string(),
            self.name.clone(),
            self.identifier.clone(),
            self.format.clone(),
            self.format_details.clone(),
            self.carrier.clone(),
            self.nav_system.clone(),
            self.network.clone(),
            self.country.clone(),
            coordinate(self.latitude),
            coordinate(self.longitude),
        ];
        fields.extend(self.extra.iter().cloned());
        fields.join(";")
    }

    /// Great-circle distance in km from the given point, if located.
    pub fn distance_from(&self, lat: f64, lon: f64) -> Option<f64> {
        Some(haversine(lat, lon, self.latitude?, self.longitude?))
    }
}

/// The mountpoint rows of a caster's table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceTable {
    pub entries: Vec<SourceTableEntry>,
}

/// The closest mountpoint to a reference position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestMountpoint {
    pub name: String,
    /// Kilometres, rounded to two decimals.
    pub distance_km: f64,
}

impl SourceTable {
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .take_while(|line| !line.eq_ignore_ascii_case("ENDSOURCETABLE"))
            .filter(|line| !line.is_empty())
            .filter_map(|line| {
                let delimiter = if line.contains(';') { ';' } else { ',' };
                let fields: Vec<&str> = line.split(delimiter).collect();
                match fields.first().map(|f| f.trim()) {
                    Some("STR") => SourceTableEntry::from_fields(&fields[1..]),
                    Some("CAS") | Some("NET") => None,
                    _ => SourceTableEntry::from_fields(&fields),
                }
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<SourceTableEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SourceTableEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Nearest located mountpoint to `(lat, lon)`; rows without coordinates
    /// are ignored.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<NearestMountpoint> {
        self.entries
            .iter()
            .filter_map(|entry| Some((entry, entry.distance_from(lat, lon)?)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(entry, distance)| NearestMountpoint {
                name: entry.name.clone(),
                distance_km: (distance * 100.0).round() / 100.0,
            })
    }

    /// Render the table body, each row CRLF terminated, followed by any
    /// extra rows and `ENDSOURCETABLE`.
    pub fn render(&self, extra_rows: &[String]) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_row());
            out.push_str("\r\n");
        }
        for row in extra_rows {
            out.push_str(row);
            out.push_str("\r\n");
        }
        out.push_str("ENDSOURCETABLE\r\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "STR;MP_NORTH;Oslo;RTCM 3.3;1005(1),1077(1);2;GPS+GLO;NETX;NOR;59.91;10.75;0;0;sNTRIP;none;B;N;0;\r\n\
        CAS;caster.example.com;2101;X;Y;0;NOR;59.9;10.7\r\n\
        \r\n\
        STR;MP_SOUTH;Cape Town;RTCM 3.2;1005(1);2;GPS;NETX;ZAF;-33.92;18.42;0\r\n\
        STR;NOWHERE;;RTCM 3.2\r\n\
        NET;NETX;operator;B;N;https://example.com;none;none;none\r\n\
        ENDSOURCETABLE\r\n\
        STR;AFTER_END;x\r\n";

    #[test]
    fn parses_stream_rows_only() {
        let table = SourceTable::parse(TABLE);
        let names: Vec<_> = table.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["MP_NORTH", "MP_SOUTH", "NOWHERE"]);

        let north = table.get("MP_NORTH").unwrap();
        assert_eq!(north.format_details, "1005(1),1077(1)");
        assert_eq!(north.latitude, Some(59.91));
        assert_eq!(north.extra.first().map(String::as_str), Some("0"));

        let nowhere = table.get("NOWHERE").unwrap();
        assert_eq!(nowhere.latitude, None);
        assert_eq!(nowhere.country, "");
    }

    #[test]
    fn nearest_to_reference() {
        let table = SourceTable::parse(TABLE);
        let nearest = table.nearest(-34.0, 18.5).unwrap();
        assert_eq!(nearest.name, "MP_SOUTH");
        assert!(nearest.distance_km < 20.0);
    }

    #[test]
    fn comma_delimited_rows() {
        let table = SourceTable::parse(
            "MYBASE,X,RTCM 3.2,1005(1),2,GPS,SNIP,USA,37.23,-115.81,0\n\
             FARBASE,Y,RTCM 3.2,1005(1),2,GPS,SNIP,USA,40.0,-100.0,0\n",
        );
        let nearest = table.nearest(37.23, -115.81).unwrap();
        assert_eq!(nearest.name, "MYBASE");
        assert_eq!(nearest.distance_km, 0.0);
    }

    #[test]
    fn empty_table_has_no_nearest() {
        let table = SourceTable::parse("\r\nENDSOURCETABLE\r\n");
        assert!(table.is_empty());
        assert!(table.nearest(0.0, 0.0).is_none());
    }

    #[test]
    fn renders_rows() {
        let table = SourceTable::from_entries(vec![SourceTableEntry::from_fields(&[
            "MP", "ID", "RTCM 3.3", "1005(5)", "0", "GPS", "SNIP", "GBR", "51.5", "-0.12", "0",
        ])
        .unwrap()]);
        insta::assert_snapshot!(
            table.render(&["NET;SNIP;gnssrelay;B;N;none;none;none;none".to_string()]).replace("\r\n", "\n"),
            @r"
        STR;MP;ID;RTCM 3.3;1005(5);0;GPS;SNIP;GBR;51.50;-0.12;0
        NET;SNIP;gnssrelay;B;N;none;none;none;none
        ENDSOURCETABLE
        "
        );
    }
}
