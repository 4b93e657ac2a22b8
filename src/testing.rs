//! In-memory DuckDB fixture shared by the test modules.

use duckdb::Connection;

use crate::config::Settings;
use crate::lookups::Lookups;
use crate::metrics::Registry;
use crate::report::Engine;
use crate::source::RowSource;
use crate::source::duck::DuckDbSource;

pub const PANEL: [&str; 5] = ["FOX_ND30", "IPM_ND10", "MEM_ND10", "OXA_ND1", "PNV_NM"];

const FIXTURE_SQL: &str = r#"
CREATE TABLE AMR_HH (
    ORGANISM VARCHAR, VALID_AST BOOLEAN, MDR_TF BOOLEAN, SEX VARCHAR, AGE_CAT VARCHAR,
    INSTITUTION VARCHAR, REGION VARCHAR, SPEC_YEAR INTEGER, SPEC_TYPE VARCHAR,
    FOX_ND30 VARCHAR, IPM_ND10 VARCHAR, MEM_ND10 VARCHAR, ETP_ND10 VARCHAR,
    OXA_ND1 VARCHAR, PNV_NM VARCHAR
);

-- 100 valid S. aureus isolates, 32 cefoxitin-resistant.
INSERT INTO AMR_HH
SELECT 'sau', TRUE, i < 20,
       CASE WHEN i % 2 = 0 THEN 'Female' ELSE 'Male' END,
       CASE i % 4 WHEN 0 THEN '65-74 years' WHEN 1 THEN 'Under 5 years'
                  WHEN 2 THEN '25–34 years' ELSE 'Unknown' END,
       'Hospital A', 'North', 2020 + (i % 3), 'Blood',
       CASE WHEN i < 32 THEN 'R' ELSE 'S' END, NULL, NULL, NULL, NULL, NULL
FROM range(100) t(i);

-- Invalid results never count.
INSERT INTO AMR_HH
SELECT 'sau', FALSE, TRUE, 'Female', 'Under 5 years', 'Hospital A', 'North', 2021, 'Blood',
       'R', NULL, NULL, NULL, NULL, NULL
FROM range(5) t(i);

INSERT INTO AMR_HH
SELECT 'eco', TRUE, FALSE, 'Male', '45–54 years', 'Hospital B', 'South', 2022, 'Urine',
       NULL, CASE WHEN i < 2 THEN 'R' ELSE 'S' END, NULL, NULL, NULL, NULL
FROM range(10) t(i);

INSERT INTO AMR_HH
SELECT 'spn', TRUE, FALSE, 'Female', '5–14 years', 'Hospital B', 'South', 2022, 'CSF',
       NULL, NULL, NULL, NULL,
       CASE WHEN i < 20 THEN 'R' ELSE 'S' END,
       CASE WHEN i < 10 THEN 'R' ELSE 'S' END
FROM range(40) t(i);

CREATE TABLE AMR_Animal (
    ORGANISM VARCHAR, VALID_AST BOOLEAN, MDR_TF BOOLEAN, SPECIES VARCHAR, SAMPLE_TYPE VARCHAR,
    REGION VARCHAR, SPEC_YEAR INTEGER, FOX_ND30 VARCHAR
);
INSERT INTO AMR_Animal VALUES
    ('sau', TRUE, TRUE, 'Cattle', 'Milk', 'North', 2021, 'R'),
    ('sau', TRUE, FALSE, 'Cattle', 'Milk', 'North', 2022, 'S'),
    ('sau', TRUE, FALSE, 'Poultry', 'Caecal', 'South', 2022, 'S');

CREATE TABLE AMU_HH (
    ANTIBIOTIC_YN BOOLEAN, AWARE VARCHAR, ATC2 VARCHAR, ATC3 VARCHAR, ATC4 VARCHAR, ATC5 VARCHAR,
    REASON_IN_NOTES VARCHAR, GUIDELINE_COMPLIANT BOOLEAN, CULTURE_TAKEN INTEGER,
    TARGETED_THERAPY VARCHAR, BIOMARKER_USED VARCHAR, STOP_REVIEW_DATE VARCHAR,
    SEX VARCHAR, AGE_CAT VARCHAR, INSTITUTION VARCHAR, REGION VARCHAR, WARD_TYPE VARCHAR,
    SURVEY_YEAR INTEGER
);
INSERT INTO AMU_HH VALUES
    (TRUE, 'WATCH', 'J01', 'J01D', 'J01DD', 'J01DD04', 'yes', TRUE, 1, 'no', 'no', 'yes',
     'Female', '65–74 years', 'Hospital A', 'North', 'Medical', 2023),
    (TRUE, 'watch', 'J01', 'J01D', 'J01DH', 'J01DH02', 'no', FALSE, 0, 'yes', 'no', 'no',
     'Male', '25–34 years', 'Hospital A', 'North', 'Surgical', 2023),
    (TRUE, 'Reserve', 'J01', 'J01X', 'J01XX', 'J01XX08', 'Yes', TRUE, 1, 'no', 'no', 'yes',
     'Male', '45–54 years', 'Hospital B', 'South', 'ICU', 2023),
    (TRUE, 'unknown_drug', 'J01', 'J01C', 'J01CR', 'J01CR02', NULL, TRUE, NULL, NULL, NULL, NULL,
     'Female', 'Under 5 years', 'Hospital B', 'South', 'Paediatric', 2024),
    (TRUE, NULL, 'J01', 'J01C', 'J01CA', 'J01CA04', 'maybe', NULL, 0, 'no', 'yes', 'no',
     'Female', '5–14 years', 'Hospital B', 'South', 'Paediatric', 2024),
    (FALSE, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL,
     'Male', '75–84 years', 'Hospital A', 'North', 'Medical', 2023),
    (FALSE, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL,
     'Female', '35–44 years', 'Hospital A', 'North', 'Surgical', 2024);

CREATE TABLE ORGANISM_NAMES (ORGANISM_CODE VARCHAR, ORGANISM_NAME VARCHAR);
INSERT INTO ORGANISM_NAMES VALUES
    ('SAU', 'S. aureus'), ('eco', 'E. coli'), ('spn', 'S. pneumoniae');

CREATE TABLE ANTIBIOTIC_NAMES (COLUMN_NAME VARCHAR, ANTIBIOTIC_NAME VARCHAR);
INSERT INTO ANTIBIOTIC_NAMES VALUES
    ('FOX_ND30', 'Cefoxitin'), ('IPM_ND10', 'Imipenem'), ('MEM_ND10', 'Meropenem'),
    ('OXA_ND1', 'Oxacillin'), ('PNV_NM', 'Penicillin V');
"#;

pub fn source() -> RowSource {
    let conn = Connection::open_in_memory().expect("open in-memory duckdb");
    conn.execute_batch(FIXTURE_SQL).expect("seed fixture");
    RowSource::DuckDb(DuckDbSource::from_connection(conn, "fixture"))
}

pub async fn engine() -> Engine {
    let source = source();
    let settings = Settings::default();
    let lookups = Lookups::load(&source, &settings, "ORGANISM_NAMES", "ANTIBIOTIC_NAMES").await;
    let registry = Registry::builtin(settings.min_sample);
    Engine::new(source, lookups, registry, settings)
}
