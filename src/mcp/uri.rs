//! `malloy://` resource URI parsing and building (spec §4.11). The builder is
//! the only sanctioned way to produce a URI; the parser is the only sanctioned
//! way to consume one — `parse(build(x)) == x` for every valid component set
//! (spec §8).

use crate::error::AppError;

const SCHEME: &str = "malloy://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalloyUri {
    Project {
        project: String,
    },
    Package {
        project: String,
        package: String,
    },
    PackageContents {
        project: String,
        package: String,
    },
    Model {
        project: String,
        package: String,
        model_path: String,
    },
    Notebook {
        project: String,
        package: String,
        notebook_path: String,
    },
    Source {
        project: String,
        package: String,
        model_path: String,
        source: String,
    },
    Query {
        project: String,
        package: String,
        model_path: String,
        query: String,
    },
    View {
        project: String,
        package: String,
        model_path: String,
        source: String,
        view: String,
    },
}

impl MalloyUri {
    pub fn build(&self) -> String {
        match self {
            MalloyUri::Project { project } => format!("{SCHEME}project/{project}"),
            MalloyUri::Package { project, package } => {
                format!("{SCHEME}project/{project}/package/{package}")
            }
            MalloyUri::PackageContents { project, package } => {
                format!("{SCHEME}project/{project}/package/{package}/contents")
            }
            MalloyUri::Model {
                project,
                package,
                model_path,
            } => format!("{SCHEME}project/{project}/package/{package}/models/{model_path}"),
            MalloyUri::Notebook {
                project,
                package,
                notebook_path,
            } => format!("{SCHEME}project/{project}/package/{package}/notebooks/{notebook_path}"),
            MalloyUri::Source {
                project,
                package,
                model_path,
                source,
            } => format!(
                "{SCHEME}project/{project}/package/{package}/models/{model_path}/sources/{source}"
            ),
            MalloyUri::Query {
                project,
                package,
                model_path,
                query,
            } => format!(
                "{SCHEME}project/{project}/package/{package}/models/{model_path}/queries/{query}"
            ),
            MalloyUri::View {
                project,
                package,
                model_path,
                source,
                view,
            } => format!(
                "{SCHEME}project/{project}/package/{package}/models/{model_path}/sources/{source}/views/{view}"
            ),
        }
    }

    pub fn parse(uri: &str) -> Result<Self, AppError> {
        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| AppError::bad_request(format!("not a malloy:// URI: {uri}")))?;
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        let bad = || AppError::bad_request(format!("malformed malloy URI: {uri}"));

        if segments.first() != Some(&"project") {
            return Err(bad());
        }
        let project = (*segments.get(1).ok_or_else(bad)?).to_string();

        if segments.len() == 2 {
            return Ok(MalloyUri::Project { project });
        }

        if segments.get(2) != Some(&"package") {
            return Err(bad());
        }
        let package = (*segments.get(3).ok_or_else(bad)?).to_string();

        if segments.len() == 4 {
            return Ok(MalloyUri::Package { project, package });
        }

        match segments.get(4) {
            Some(&"contents") if segments.len() == 5 => {
                Ok(MalloyUri::PackageContents { project, package })
            }
            Some(&"notebooks") => {
                let notebook_path = segments[5..].join("/");
                if notebook_path.is_empty() {
                    return Err(bad());
                }
                Ok(MalloyUri::Notebook {
                    project,
                    package,
                    notebook_path,
                })
            }
            Some(&"models") => parse_under_model(project, package, &segments[5..], uri),
            _ => Err(bad()),
        }
    }
}

fn parse_under_model(
    project: String,
    package: String,
    rest: &[&str],
    uri: &str,
) -> Result<MalloyUri, AppError> {
    let bad = || AppError::bad_request(format!("malformed malloy URI: {uri}"));

    // Find a trailing `/sources/{name}[/views/{name}]` or `/queries/{name}`
    // suffix; everything before it is the (possibly slash-containing) model path.
    for (i, segment) in rest.iter().enumerate() {
        if *segment == "sources" || *segment == "queries" {
            let model_path = rest[..i].join("/");
            if model_path.is_empty() {
                return Err(bad());
            }
            let tail = &rest[i..];
            return match tail {
                ["sources", source] => Ok(MalloyUri::Source {
                    project,
                    package,
                    model_path,
                    source: source.to_string(),
                }),
                ["sources", source, "views", view] => Ok(MalloyUri::View {
                    project,
                    package,
                    model_path,
                    source: source.to_string(),
                    view: view.to_string(),
                }),
                ["queries", query] => Ok(MalloyUri::Query {
                    project,
                    package,
                    model_path,
                    query: query.to_string(),
                }),
                _ => Err(bad()),
            };
        }
    }

    let model_path = rest.join("/");
    if model_path.is_empty() {
        return Err(bad());
    }
    Ok(MalloyUri::Model {
        project,
        package,
        model_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cases() -> Vec<MalloyUri> {
        vec![
            MalloyUri::Project { project: "home".into() },
            MalloyUri::Package { project: "home".into(), package: "faa".into() },
            MalloyUri::PackageContents { project: "home".into(), package: "faa".into() },
            MalloyUri::Model {
                project: "home".into(),
                package: "faa".into(),
                model_path: "flights.malloy".into(),
            },
            MalloyUri::Notebook {
                project: "home".into(),
                package: "faa".into(),
                notebook_path: "analysis.malloynb".into(),
            },
            MalloyUri::Source {
                project: "home".into(),
                package: "faa".into(),
                model_path: "flights.malloy".into(),
                source: "flights".into(),
            },
            MalloyUri::Query {
                project: "home".into(),
                package: "faa".into(),
                model_path: "flights.malloy".into(),
                query: "top_carriers".into(),
            },
            MalloyUri::View {
                project: "home".into(),
                package: "faa".into(),
                model_path: "flights.malloy".into(),
                source: "flights".into(),
                view: "by_carrier".into(),
            },
        ]
    }

    #[test]
    fn round_trips_every_variant() {
        for case in cases() {
            let built = case.build();
            let parsed = MalloyUri::parse(&built).unwrap();
            assert_eq!(parsed, case, "round trip failed for {built}");
        }
    }

    #[test]
    fn model_path_with_subdirectory_parses() {
        let uri = "malloy://project/home/package/faa/models/nested/flights.malloy";
        let parsed = MalloyUri::parse(uri).unwrap();
        assert_eq!(
            parsed,
            MalloyUri::Model {
                project: "home".into(),
                package: "faa".into(),
                model_path: "nested/flights.malloy".into(),
            }
        );
    }

    #[test]
    fn rejects_non_malloy_scheme() {
        assert!(MalloyUri::parse("http://example.com").is_err());
    }
}
