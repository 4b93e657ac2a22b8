use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::aggregate::{MinSample, Tally, aggregate, column_key, count_by, overall};
use crate::classify::{Combine, Indicator, ResistanceRule, aware, row_indicator};
use crate::cli::{ReportArgs, SourceArgs};
use crate::config::Settings;
use crate::dataset::{Dataset, col};
use crate::error::ApiError;
use crate::lookups::Lookups;
use crate::metrics::{Registry, ResistanceMetric};
use crate::query::{Op, Predicate, Select, apply_filters};
use crate::rank::{ChartPoint, SortOrder, rank_counts, rank_rates};
use crate::source::{CountMode, Row, RowSource};

pub type Params = HashMap<String, String>;

const ATC_LEVELS: [&str; 4] = ["2", "3", "4", "5"];

#[derive(Debug)]
pub struct Sourced<T> {
    pub table: &'static str,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ResistanceOverall {
    pub resistant: u64,
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct PrevalenceOverall {
    pub positive: u64,
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateReport<O> {
    pub metric: String,
    pub title: String,
    pub overall: O,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<&'static str>,
    pub groups: Vec<ChartPoint>,
    pub min_sample: MinSample,
}

#[derive(Debug, Serialize)]
pub struct Distribution {
    pub column: &'static str,
    pub total: u64,
    pub categories: Vec<ChartPoint>,
}

#[derive(Debug, Serialize)]
pub struct AwareReport {
    pub total: u64,
    pub excluded: u64,
    pub categories: Vec<ChartPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Antibiogram {
    pub organism: String,
    pub organism_name: String,
    pub isolates: u64,
    pub antibiotics: Vec<ChartPoint>,
    pub min_sample: MinSample,
}

#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub column: &'static str,
    pub values: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u64,
    pub filtered: u64,
    pub count_mode: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomRule {
    #[serde(default)]
    pub dataset: Option<String>,
    pub organisms: Vec<String>,
    pub combine: String,
    pub antibiotics: Vec<String>,
}

#[derive(Debug)]
struct Options {
    predicates: Vec<Predicate>,
    group_by: Option<&'static str>,
    sort: Option<SortOrder>,
    min: MinSample,
    limit: Option<usize>,
}

impl Options {
    fn parse(dataset: Dataset, raw: &Params, default_min: MinSample) -> Result<Self, ApiError> {
        let predicates = apply_filters(raw, dataset.filter_columns(), Some(dataset.year_column()))?;

        let group_by = match param(raw, "group_by") {
            None => None,
            Some(g) => Some(dataset.column(g).ok_or_else(|| {
                ApiError::invalid(
                    format!("cannot group {} by '{g}'", dataset.key()),
                    dataset.filter_columns().iter().copied(),
                )
            })?),
        };

        let sort = param(raw, "sort")
            .map(|s| {
                SortOrder::parse(s).ok_or_else(|| {
                    ApiError::invalid(format!("unknown sort '{s}'"), SortOrder::ACCEPTED)
                })
            })
            .transpose()?;

        let mut min = default_min;
        if let Some(v) = param(raw, "min_n") {
            let n: u64 = v.parse().map_err(|_| {
                ApiError::bad_request(format!("min_n must be a non-negative integer, got '{v}'"))
            })?;
            min = if n == 0 {
                MinSample::Disabled
            } else {
                MinSample::Enforced(n)
            };
        }
        if let Some(v) = param(raw, "no_limit") {
            match v.to_ascii_lowercase().as_str() {
                "true" | "1" => min = MinSample::Disabled,
                "false" | "0" => {}
                _ => {
                    return Err(ApiError::invalid(
                        format!("no_limit must be true or false, got '{v}'"),
                        ["true", "false"],
                    ));
                }
            }
        }

        let limit = param(raw, "limit")
            .map(|v| match v.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(ApiError::bad_request(format!(
                    "limit must be a positive integer, got '{v}'"
                ))),
            })
            .transpose()?;

        Ok(Self {
            predicates,
            group_by,
            sort,
            min,
            limit,
        })
    }

    fn apply(&self, q: Select) -> Select {
        q.filters(self.predicates.iter().cloned()).columns(self.group_by)
    }
}

fn param<'a>(raw: &'a Params, key: &str) -> Option<&'a str> {
    raw.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_dataset(key: &str) -> Result<Dataset, ApiError> {
    Dataset::parse(key).ok_or_else(|| {
        ApiError::invalid(
            format!("unknown dataset '{key}'"),
            Dataset::accepted_keys(),
        )
    })
}

fn isolate_dataset(key: &str) -> Result<Dataset, ApiError> {
    let accepted = || {
        Dataset::ALL
            .iter()
            .filter(|d| d.is_isolate())
            .map(|d| d.key())
            .collect::<Vec<_>>()
    };
    match Dataset::parse(key) {
        Some(d) if d.is_isolate() => Ok(d),
        _ => Err(ApiError::invalid(
            format!("'{key}' is not an isolate dataset"),
            accepted(),
        )),
    }
}

fn parse_column(dataset: Dataset, name: &str) -> Result<&'static str, ApiError> {
    dataset.column(name).ok_or_else(|| {
        ApiError::invalid(
            format!("column '{name}' is not available for {}", dataset.key()),
            dataset.filter_columns().iter().copied(),
        )
    })
}

pub struct Engine {
    source: RowSource,
    lookups: Lookups,
    registry: Registry,
    settings: Settings,
}

impl Engine {
    pub fn new(
        source: RowSource,
        lookups: Lookups,
        registry: Registry,
        settings: Settings,
    ) -> Self {
        Self {
            source,
            lookups,
            registry,
            settings,
        }
    }

    pub async fn connect(args: &SourceArgs) -> anyhow::Result<Self> {
        let settings = Settings::from_args(args);
        let source = RowSource::connect(args, &settings)?;
        let lookups =
            Lookups::load(&source, &settings, &args.organism_view, &args.antibiotic_view).await;
        let registry = Registry::builtin(settings.min_sample);
        Ok(Self::new(source, lookups, registry, settings))
    }

    pub fn source_label(&self) -> &str {
        self.source.label()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    fn label(&self, column: &str, key: &str) -> String {
        if column == col::ORGANISM {
            self.lookups.organism_name(key)
        } else {
            key.to_string()
        }
    }

    async fn fetch(&self, q: &Select) -> Result<Vec<Row>, ApiError> {
        Ok(self.source.fetch(q, self.settings.fetch_timeout).await?)
    }

    fn rank_groups<C>(&self, rows: &[Row], opts: &Options, classify: C) -> Vec<ChartPoint>
    where
        C: Fn(&Row) -> Indicator,
    {
        let Some(group) = opts.group_by else {
            return Vec::new();
        };
        let default = if group == col::AGE_CAT {
            SortOrder::AgeOrder
        } else {
            SortOrder::RateDesc
        };
        let tallies = aggregate(rows, column_key(group), classify);
        let mut points = rank_rates(
            &tallies,
            opts.sort.unwrap_or(default),
            opts.min,
            &self.lookups.ages,
            |k| self.label(group, k),
        );
        if let Some(n) = opts.limit {
            points.truncate(n);
        }
        points
    }

    pub async fn resistance(
        &self,
        id: &str,
        raw: &Params,
    ) -> Result<Sourced<RateReport<ResistanceOverall>>, ApiError> {
        let metric = self.registry.resistance(id).ok_or_else(|| {
            ApiError::invalid(
                format!("unknown resistance metric '{id}'"),
                self.registry.resistance_ids(),
            )
        })?;
        self.run_resistance(metric, raw).await
    }

    pub async fn custom_resistance(
        &self,
        body: &CustomRule,
        raw: &Params,
    ) -> Result<Sourced<RateReport<ResistanceOverall>>, ApiError> {
        let dataset = match body.dataset.as_deref() {
            None => Dataset::Human,
            Some(key) => isolate_dataset(key)?,
        };
        let combine = Combine::parse(&body.combine).ok_or_else(|| {
            ApiError::invalid(format!("unknown combine rule '{}'", body.combine), Combine::ACCEPTED)
        })?;
        let columns = body
            .antibiotics
            .iter()
            .map(|a| {
                self.lookups
                    .antibiotic_column(a)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ApiError::invalid(
                            format!("unknown antibiotic '{a}'"),
                            self.lookups.antibiotic_columns(),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rule = ResistanceRule::new(combine, columns)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        let organisms: Vec<String> = body
            .organisms
            .iter()
            .map(|o| o.trim().to_ascii_lowercase())
            .filter(|o| !o.is_empty())
            .collect();
        if organisms.is_empty() {
            return Err(ApiError::bad_request("at least one organism code is required"));
        }

        let metric = ResistanceMetric {
            id: "custom".to_string(),
            title: format!("Resistance to {}", rule.columns.join(", ")),
            dataset,
            organisms,
            rule,
            min_sample: self.settings.min_sample,
        };
        self.run_resistance(&metric, raw).await
    }

    async fn run_resistance(
        &self,
        metric: &ResistanceMetric,
        raw: &Params,
    ) -> Result<Sourced<RateReport<ResistanceOverall>>, ApiError> {
        let dataset = metric.dataset;
        let opts = Options::parse(dataset, raw, metric.min_sample)?;

        let mut q = Select::table(dataset.table())
            .columns(metric.rule.columns.iter().cloned())
            .filter(Predicate::is_in(col::ORGANISM, metric.organisms.iter().cloned()));
        if let Some(flag) = dataset.valid_flag() {
            q = q.filter(Predicate::eq(flag, true));
        }
        let rows = self.fetch(&opts.apply(q)).await?;

        let classify = |r: &Row| metric.rule.evaluate(r);
        let total = overall(&rows, classify);
        let groups = self.rank_groups(&rows, &opts, classify);
        tracing::debug!(
            "{}: {}/{} resistant over {} rows",
            metric.id,
            total.numerator,
            total.denominator,
            rows.len()
        );

        Ok(Sourced {
            table: dataset.table(),
            data: RateReport {
                metric: metric.id.clone(),
                title: metric.title.clone(),
                overall: ResistanceOverall {
                    resistant: total.numerator,
                    total: total.denominator,
                    percentage: total.rate(opts.min),
                },
                group_by: opts.group_by,
                groups,
                min_sample: opts.min,
            },
        })
    }

    pub async fn prevalence(
        &self,
        id: &str,
        raw: &Params,
    ) -> Result<Sourced<RateReport<PrevalenceOverall>>, ApiError> {
        let metric = self.registry.prevalence(id).ok_or_else(|| {
            ApiError::invalid(
                format!("unknown prevalence metric '{id}'"),
                self.registry.prevalence_ids(),
            )
        })?;
        let dataset = metric.dataset;
        let opts = Options::parse(dataset, raw, metric.min_sample)?;

        let q = Select::table(dataset.table())
            .columns([metric.indicator.as_str()])
            .filters(metric.scope.iter().cloned());
        let rows = self.fetch(&opts.apply(q)).await?;

        let classify = |r: &Row| row_indicator(r, &metric.indicator);
        let total = overall(&rows, classify);
        let groups = self.rank_groups(&rows, &opts, classify);

        Ok(Sourced {
            table: dataset.table(),
            data: RateReport {
                metric: metric.id.clone(),
                title: metric.title.clone(),
                overall: PrevalenceOverall {
                    positive: total.numerator,
                    total: total.denominator,
                    percentage: total.rate(opts.min),
                },
                group_by: opts.group_by,
                groups,
                min_sample: opts.min,
            },
        })
    }

    /// AWaRe categories of the antibiotics given. Rows without a category are
    /// reported as excluded rather than counted.
    pub async fn aware_distribution(&self, raw: &Params) -> Result<Sourced<AwareReport>, ApiError> {
        let dataset = Dataset::Usage;
        let opts = Options::parse(dataset, raw, self.settings.min_sample)?;
        let q = Select::table(dataset.table())
            .columns([col::AWARE])
            .filter(Predicate::eq(col::ANTIBIOTIC_YN, true));
        let rows = self.fetch(&opts.apply(q)).await?;

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut excluded = 0u64;
        for row in &rows {
            match row.get(col::AWARE).and_then(aware) {
                Some(category) => *counts.entry(category.as_str().to_string()).or_default() += 1,
                None => excluded += 1,
            }
        }

        let mut categories = rank_counts(
            &counts,
            opts.sort.unwrap_or(SortOrder::CountDesc),
            &self.lookups.ages,
            str::to_string,
        );
        if let Some(n) = opts.limit {
            categories.truncate(n);
        }
        Ok(Sourced {
            table: dataset.table(),
            data: AwareReport {
                total: counts.values().sum(),
                excluded,
                categories,
            },
        })
    }

    pub async fn atc_distribution(&self, raw: &Params) -> Result<Sourced<Distribution>, ApiError> {
        let column = match param(raw, "level") {
            Some("2") => col::ATC2,
            Some("3") => col::ATC3,
            Some("4") => col::ATC4,
            Some("5") => col::ATC5,
            other => {
                return Err(ApiError::invalid(
                    format!("level must be one of 2-5, got '{}'", other.unwrap_or("")),
                    ATC_LEVELS,
                ));
            }
        };
        self.distribution_of(
            Dataset::Usage,
            column,
            vec![Predicate::eq(col::ANTIBIOTIC_YN, true)],
            raw,
        )
        .await
    }

    pub async fn distribution(
        &self,
        dataset: &str,
        column: &str,
        raw: &Params,
    ) -> Result<Sourced<Distribution>, ApiError> {
        let dataset = parse_dataset(dataset)?;
        let column = parse_column(dataset, column)?;
        self.distribution_of(dataset, column, Vec::new(), raw).await
    }

    async fn distribution_of(
        &self,
        dataset: Dataset,
        column: &'static str,
        scope: Vec<Predicate>,
        raw: &Params,
    ) -> Result<Sourced<Distribution>, ApiError> {
        let opts = Options::parse(dataset, raw, self.settings.min_sample)?;
        let q = Select::table(dataset.table()).columns([column]).filters(scope);
        let rows = self.fetch(&opts.apply(q)).await?;

        let counts = count_by(&rows, column_key(column));
        let default = if column == col::AGE_CAT {
            SortOrder::AgeOrder
        } else {
            SortOrder::CountDesc
        };
        let mut categories = rank_counts(
            &counts,
            opts.sort.unwrap_or(default),
            &self.lookups.ages,
            |k| self.label(column, k),
        );
        if let Some(n) = opts.limit {
            categories.truncate(n);
        }
        Ok(Sourced {
            table: dataset.table(),
            data: Distribution {
                column,
                total: counts.values().sum(),
                categories,
            },
        })
    }

    /// Resistance of one organism to each antibiotic of the panel. Antibiotics
    /// without a tested isolate are left out.
    pub async fn antibiogram(
        &self,
        dataset: &str,
        organism: &str,
        raw: &Params,
    ) -> Result<Sourced<Antibiogram>, ApiError> {
        let dataset = isolate_dataset(dataset)?;
        let opts = Options::parse(dataset, raw, self.settings.min_sample)?;

        let panel: Vec<&str> = match param(raw, "antibiotics") {
            None => self.lookups.antibiotic_columns(),
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|a| {
                    self.lookups.antibiotic_column(a).ok_or_else(|| {
                        ApiError::invalid(
                            format!("unknown antibiotic '{a}'"),
                            self.lookups.antibiotic_columns(),
                        )
                    })
                })
                .collect::<Result<_, _>>()?,
        };
        if panel.is_empty() {
            return Err(ApiError::bad_request("no antibiotics selected"));
        }

        let code = organism.trim().to_ascii_lowercase();
        let mut q = Select::table(dataset.table())
            .columns(panel.iter().copied())
            .filter(Predicate::eq(col::ORGANISM, code.as_str()))
            .timeout(self.settings.wide_fetch_timeout);
        if let Some(flag) = dataset.valid_flag() {
            q = q.filter(Predicate::eq(flag, true));
        }
        let rows = self.fetch(&opts.apply(q)).await?;
        if rows.is_empty() {
            return Err(ApiError::NotFound(format!(
                "no isolates found for organism '{code}'"
            )));
        }

        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        for &column in &panel {
            let rule = ResistanceRule::single(column);
            let t = overall(&rows, |r| rule.evaluate(r));
            if t.denominator > 0 {
                tallies.insert(column.to_string(), t);
            }
        }
        let mut antibiotics = rank_rates(
            &tallies,
            opts.sort.unwrap_or(SortOrder::RateDesc),
            opts.min,
            &self.lookups.ages,
            |k| self.lookups.antibiotic_name(k),
        );
        if let Some(n) = opts.limit {
            antibiotics.truncate(n);
        }

        Ok(Sourced {
            table: dataset.table(),
            data: Antibiogram {
                organism_name: self.lookups.organism_name(&code),
                organism: code,
                isolates: rows.len() as u64,
                antibiotics,
                min_sample: opts.min,
            },
        })
    }

    pub async fn filter_options(
        &self,
        dataset: &str,
        column: &str,
        raw: &Params,
    ) -> Result<Sourced<FilterOptions>, ApiError> {
        let dataset = parse_dataset(dataset)?;
        let column = parse_column(dataset, column)?;
        let mut opts = Options::parse(dataset, raw, self.settings.min_sample)?;
        opts.predicates.retain(|p| p.column != column);
        opts.group_by = None;

        let q = Select::table(dataset.table())
            .columns([column])
            .filter(Predicate::new(column, Op::NotNull));
        let rows = self.fetch(&opts.apply(q)).await?;

        let distinct: BTreeSet<String> = rows.iter().filter_map(column_key(column)).collect();
        let mut values: Vec<String> = distinct.into_iter().collect();
        if column == col::AGE_CAT {
            self.lookups.ages.sort(&mut values);
        }
        Ok(Sourced {
            table: dataset.table(),
            data: FilterOptions { column, values },
        })
    }

    pub async fn summary(&self, dataset: &str, raw: &Params) -> Result<Sourced<Summary>, ApiError> {
        let dataset = parse_dataset(dataset)?;
        let opts = Options::parse(dataset, raw, self.settings.min_sample)?;
        let mode = param(raw, "count")
            .map(|s| {
                CountMode::parse(s).ok_or_else(|| {
                    ApiError::invalid(format!("unknown count mode '{s}'"), CountMode::ACCEPTED)
                })
            })
            .transpose()?
            .unwrap_or(CountMode::Exact);

        let all = Select::table(dataset.table());
        let filtered = all.clone().filters(opts.predicates.iter().cloned());
        let timeout = self.settings.count_timeout;
        let (total, filtered) = tokio::try_join!(
            self.source.count(&all, mode, timeout),
            self.source.count(&filtered, mode, timeout)
        )?;

        Ok(Sourced {
            table: dataset.table(),
            data: Summary {
                total,
                filtered,
                count_mode: mode.as_str(),
            },
        })
    }
}

pub async fn run(args: ReportArgs) -> anyhow::Result<()> {
    let engine = Engine::connect(&args.source).await?;

    let mut raw: Params = args.filters.into_iter().collect();
    if let Some(g) = args.group_by {
        raw.insert("group_by".to_string(), g);
    }
    if let Some(s) = args.sort {
        raw.insert("sort".to_string(), s);
    }
    if args.no_limit {
        raw.insert("no_limit".to_string(), "true".to_string());
    }

    let data = if engine.registry().resistance(&args.metric).is_some() {
        serde_json::to_value(engine.resistance(&args.metric, &raw).await?.data)?
    } else if engine.registry().prevalence(&args.metric).is_some() {
        serde_json::to_value(engine.prevalence(&args.metric, &raw).await?.data)?
    } else {
        let mut known = engine.registry().resistance_ids();
        known.extend(engine.registry().prevalence_ids());
        bail!("unknown metric '{}'; known: {}", args.metric, known.join(", "));
    };

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::RATE_UNAVAILABLE;
    use crate::testing;
    use pretty_assertions::assert_eq;

    fn raw(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn mrsa_overall_rate() {
        let engine = testing::engine().await;
        let out = engine.resistance("mrsa", &raw(&[])).await.unwrap();
        assert_eq!(out.table, "AMR_HH");
        let o = &out.data.overall;
        assert_eq!((o.resistant, o.total, o.percentage), (32, 100, 32.0));
        assert!(out.data.groups.is_empty());
    }

    #[tokio::test]
    async fn age_groups_follow_clinical_order() {
        let engine = testing::engine().await;
        let out = engine
            .resistance("mrsa", &raw(&[("group_by", "age_cat"), ("no_limit", "true")]))
            .await
            .unwrap();
        let keys: Vec<&str> = out.data.groups.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["Under 5 years", "25–34 years", "65-74 years", "Unknown"]);
        assert_eq!(out.data.group_by, Some(col::AGE_CAT));
    }

    #[tokio::test]
    async fn small_samples_are_marked_unavailable() {
        let engine = testing::engine().await;
        let out = engine.resistance("cr-eco", &raw(&[])).await.unwrap();
        assert_eq!(out.data.overall.total, 10);
        assert_eq!(out.data.overall.percentage, RATE_UNAVAILABLE);

        let out = engine
            .resistance("cr-eco", &raw(&[("no_limit", "true")]))
            .await
            .unwrap();
        assert_eq!(out.data.overall.percentage, 20.0);
        assert_eq!(out.data.min_sample, MinSample::Disabled);

        let out = engine.resistance("cr-eco", &raw(&[("min_n", "5")])).await.unwrap();
        assert_eq!(out.data.overall.percentage, 20.0);
    }

    #[tokio::test]
    async fn penicillin_rule_needs_both_results() {
        let engine = testing::engine().await;
        let out = engine.resistance("prsp", &raw(&[])).await.unwrap();
        let o = &out.data.overall;
        assert_eq!((o.resistant, o.total, o.percentage), (10, 40, 25.0));

        let any = CustomRule {
            dataset: None,
            organisms: vec!["SPN".into()],
            combine: "any".into(),
            antibiotics: vec!["oxa_nd1".into(), "PNV_NM".into()],
        };
        let out = engine.custom_resistance(&any, &raw(&[])).await.unwrap();
        assert_eq!(out.data.overall.resistant, 20);
    }

    #[tokio::test]
    async fn custom_rule_validation() {
        let engine = testing::engine().await;
        let mut rule = CustomRule {
            dataset: None,
            organisms: vec!["sau".into()],
            combine: "most".into(),
            antibiotics: vec!["FOX_ND30".into()],
        };
        match engine.custom_resistance(&rule, &raw(&[])).await.unwrap_err() {
            ApiError::InvalidInput { accepted, .. } => assert_eq!(accepted, Combine::ACCEPTED),
            other => panic!("unexpected {other:?}"),
        }

        rule.combine = "single".into();
        rule.antibiotics = vec!["FOX_ND30".into(), "OXA_ND1".into()];
        assert!(matches!(
            engine.custom_resistance(&rule, &raw(&[])).await.unwrap_err(),
            ApiError::InvalidInput { .. }
        ));

        rule.antibiotics = vec!["XYZ_ND1".into()];
        assert!(matches!(
            engine.custom_resistance(&rule, &raw(&[])).await.unwrap_err(),
            ApiError::InvalidInput { .. }
        ));

        rule.antibiotics = vec!["FOX_ND30".into()];
        rule.dataset = Some("usage".into());
        assert!(matches!(
            engine.custom_resistance(&rule, &raw(&[])).await.unwrap_err(),
            ApiError::InvalidInput { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_metric_and_sort_list_accepted_values() {
        let engine = testing::engine().await;
        match engine.resistance("mrsb", &raw(&[])).await.unwrap_err() {
            ApiError::InvalidInput { accepted, .. } => {
                assert!(accepted.contains(&"mrsa".to_string()))
            }
            other => panic!("unexpected {other:?}"),
        }
        match engine.resistance("mrsa", &raw(&[("sort", "size")])).await.unwrap_err() {
            ApiError::InvalidInput { accepted, .. } => assert_eq!(accepted, SortOrder::ACCEPTED),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn filters_narrow_the_rows() {
        let engine = testing::engine().await;
        let out = engine
            .resistance("mrsa", &raw(&[("sex", "Female"), ("year_to", "2021")]))
            .await
            .unwrap();
        // Even i in 0..100 whose year (2020 + i % 3) is at most 2021.
        assert_eq!(out.data.overall.total, 33);
    }

    #[tokio::test]
    async fn mdr_prevalence_is_scoped_to_valid_isolates() {
        let engine = testing::engine().await;
        let out = engine.prevalence("mdr", &raw(&[])).await.unwrap();
        let o = &out.data.overall;
        assert_eq!((o.positive, o.total, o.percentage), (20, 150, 13.3));
    }

    #[tokio::test]
    async fn usage_indicators() {
        let engine = testing::engine().await;
        let out = engine.prevalence("antibiotic-use", &raw(&[])).await.unwrap();
        assert_eq!(out.table, "AMU_HH");
        let o = &out.data.overall;
        assert_eq!((o.positive, o.total, o.percentage), (5, 7, 71.4));

        let out = engine.prevalence("reason-in-notes", &raw(&[])).await.unwrap();
        assert_eq!(out.data.overall.percentage, RATE_UNAVAILABLE);
        let out = engine
            .prevalence("reason-in-notes", &raw(&[("no_limit", "true")]))
            .await
            .unwrap();
        let o = &out.data.overall;
        assert_eq!((o.positive, o.total, o.percentage), (2, 3, 66.7));
    }

    #[tokio::test]
    async fn aware_counts_and_exclusions() {
        let engine = testing::engine().await;
        let out = engine.aware_distribution(&raw(&[])).await.unwrap();
        let counts: Vec<(&str, u64)> = out
            .data
            .categories
            .iter()
            .map(|p| (p.key.as_str(), p.count))
            .collect();
        assert_eq!(counts, vec![("Watch", 2), ("Other", 1), ("Reserve", 1)]);
        assert_eq!(out.data.total, 4);
        assert_eq!(out.data.excluded, 1);
    }

    #[tokio::test]
    async fn atc_levels() {
        let engine = testing::engine().await;
        let out = engine.atc_distribution(&raw(&[("level", "3")])).await.unwrap();
        let keys: Vec<&str> = out.data.categories.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["J01C", "J01D", "J01X"]);
        assert_eq!(out.data.categories[0].value, 40.0);

        match engine.atc_distribution(&raw(&[("level", "7")])).await.unwrap_err() {
            ApiError::InvalidInput { accepted, .. } => assert_eq!(accepted, ATC_LEVELS),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn organism_distribution_is_labelled_and_limited() {
        let engine = testing::engine().await;
        let out = engine
            .distribution("human", "organism", &raw(&[("valid_ast", "true"), ("limit", "2")]))
            .await
            .unwrap();
        assert_eq!(out.data.total, 150);
        assert_eq!(out.data.categories.len(), 2);
        assert_eq!(out.data.categories[0].key, "sau");
        assert_eq!(out.data.categories[0].label, "S. aureus");
        assert_eq!(out.data.categories[1].key, "spn");

        assert!(matches!(
            engine.distribution("human", "AWARE", &raw(&[])).await.unwrap_err(),
            ApiError::InvalidInput { .. }
        ));
        assert!(matches!(
            engine.distribution("plants", "SEX", &raw(&[])).await.unwrap_err(),
            ApiError::InvalidInput { .. }
        ));
    }

    #[tokio::test]
    async fn antibiogram_for_known_and_unknown_organisms() {
        let engine = testing::engine().await;
        let out = engine.antibiogram("human", "SAU", &raw(&[])).await.unwrap();
        assert_eq!(out.data.organism, "sau");
        assert_eq!(out.data.organism_name, "S. aureus");
        assert_eq!(out.data.isolates, 100);
        let fox = &out.data.antibiotics[0];
        assert_eq!(fox.key, "FOX_ND30");
        assert_eq!(fox.label, "Cefoxitin");
        assert_eq!(fox.value, 32.0);

        let err = engine.antibiogram("human", "xyz", &raw(&[])).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = engine
            .antibiogram("human", "sau", &raw(&[("antibiotics", "FOX_ND30,NOPE")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn filter_options_ignore_their_own_column() {
        let engine = testing::engine().await;
        let out = engine
            .filter_options(
                "human",
                "age_cat",
                &raw(&[("age_cat", "Unknown"), ("organism", "sau")]),
            )
            .await
            .unwrap();
        assert_eq!(
            out.data.values,
            vec!["Under 5 years", "25–34 years", "65-74 years", "Unknown"]
        );
    }

    #[tokio::test]
    async fn summary_counts() {
        let engine = testing::engine().await;
        let out = engine
            .summary("usage", &raw(&[("antibiotic_yn", "true")]))
            .await
            .unwrap();
        assert_eq!((out.data.total, out.data.filtered), (7, 5));
        assert_eq!(out.data.count_mode, "exact");

        assert!(matches!(
            engine.summary("usage", &raw(&[("count", "roughly")])).await.unwrap_err(),
            ApiError::InvalidInput { .. }
        ));
    }
}
