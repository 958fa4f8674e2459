//! Earth Engine REST client.
//!
//! Serializes the whole composite-and-sample pipeline as one Earth Engine
//! expression graph (load, date filter, cloud filter, per-image band
//! derivation, median reduction, `reduceRegions` with a mean reducer)
//! and evaluates it with a single `value:compute` call. The index
//! formulas are translated from their [`BandExpr`] trees into Earth
//! Engine band arithmetic, so the formulas themselves live only in the
//! indices crate.
//!
//! Earth Engine's `Image.divide` masks pixels where the denominator is
//! zero, matching the local evaluator's masking semantics.

use std::collections::BTreeMap;

use async_trait::async_trait;
use oreum_watch_indices::BandExpr;
use oreum_watch_stats_models::SiteSample;
use serde_json::{Value, json};

use crate::{CompositeRequest, ImageryError, ImagerySource};

/// Production Earth Engine REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://earthengine.googleapis.com/v1";

/// Argument name bound by the per-image mapping function.
const MAP_ARG: &str = "scene";

/// Imagery source backed by the Earth Engine REST API.
pub struct EarthEngineSource {
    client: reqwest::Client,
    api_base: String,
    project: String,
    token: String,
}

impl EarthEngineSource {
    /// Creates a client for `project` authenticated with `token`.
    #[must_use]
    pub fn new(client: reqwest::Client, project: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            project: project.into(),
            token: token.into(),
        }
    }

    /// Overrides the API base URL (tests, regional endpoints).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait]
impl ImagerySource for EarthEngineSource {
    async fn sample_indices(
        &self,
        request: &CompositeRequest<'_>,
    ) -> Result<Vec<SiteSample>, ImageryError> {
        let expression = build_expression(request);
        let url = format!(
            "{}/projects/{}/value:compute",
            self.api_base, self.project
        );

        log::info!(
            "Evaluating composite of {} over {} sites ({} to {})",
            request.collection,
            request.sites.len(),
            request.window.start_iso(),
            request.window.end_iso(),
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "expression": expression }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ImageryError::Compute {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| ImageryError::Parse {
            message: format!("invalid compute response: {e}"),
        })?;

        parse_feature_collection(&value)
    }
}

/// Builds the full pipeline expression for one request.
#[must_use]
pub fn build_expression(request: &CompositeRequest<'_>) -> Value {
    let mut graph = ExprGraph::default();

    // ImageCollection.load(collection)
    let collection_id = graph.constant(json!(request.collection));
    let loaded = graph.invoke("ImageCollection.load", &[("id", collection_id)]);

    // .filterDate(start, end)
    let start = graph.constant(json!(request.window.start_iso()));
    let end = graph.constant(json!(request.window.end_iso()));
    let date_range = graph.invoke("DateRange", &[("start", start), ("end", end)]);
    let time_field = graph.constant(json!("system:time_start"));
    let date_filter = graph.invoke(
        "Filter.dateRangeContains",
        &[("leftValue", date_range), ("rightField", time_field)],
    );
    let by_date = graph.invoke(
        "Collection.filter",
        &[("collection", loaded), ("filter", date_filter)],
    );

    // .filter(cloud cover strictly below the ceiling)
    let cloud_field = graph.constant(json!("CLOUDY_PIXEL_PERCENTAGE"));
    let ceiling = graph.constant(json!(request.cloud_ceiling_pct));
    let cloud_filter = graph.invoke(
        "Filter.lessThan",
        &[("leftField", cloud_field), ("rightValue", ceiling)],
    );
    let by_cloud = graph.invoke(
        "Collection.filter",
        &[("collection", by_date), ("filter", cloud_filter)],
    );

    // .map(add the derived index bands)
    let scene_arg = graph.argument(MAP_ARG);
    let mut augmented = scene_arg;
    for index in request.indices {
        let derived = encode_band_expr(&mut graph, &index.formula(), scene_arg);
        let names = graph.constant(json!([index.band_name()]));
        let renamed = graph.invoke("Image.rename", &[("input", derived), ("names", names)]);
        augmented = graph.invoke(
            "Image.addBands",
            &[("dstImg", augmented), ("srcImg", renamed)],
        );
    }
    let mapper = graph.function(&[MAP_ARG], augmented);
    let mapped = graph.invoke(
        "Collection.map",
        &[("collection", by_cloud), ("baseAlgorithm", mapper)],
    );

    // .median()
    let composite = graph.invoke("reduce.median", &[("collection", mapped)]);

    // Feature collection of tagged site points
    let mut features = Vec::with_capacity(request.sites.len());
    for site in request.sites {
        let coordinates = graph.constant(json!([site.point.x(), site.point.y()]));
        let point = graph.invoke("GeometryConstructors.Point", &[("coordinates", coordinates)]);
        let metadata = graph.constant(json!({ "oreum_id": site.site_id }));
        features.push(graph.invoke(
            "Feature",
            &[("geometry", point), ("metadata", metadata)],
        ));
    }
    let feature_list = graph.array(&features);
    let sites = graph.invoke("Collection", &[("features", feature_list)]);

    // .reduceRegions(mean, scale)
    let reducer = graph.invoke("Reducer.mean", &[]);
    let scale = graph.constant(json!(request.scale));
    let sampled = graph.invoke(
        "Image.reduceRegions",
        &[
            ("image", composite),
            ("collection", sites),
            ("reducer", reducer),
            ("scale", scale),
        ],
    );

    graph.finish(sampled)
}

/// Translates a formula tree into Earth Engine band arithmetic over the
/// mapped image.
fn encode_band_expr(graph: &mut ExprGraph, expr: &BandExpr, image: NodeRef) -> NodeRef {
    match expr {
        BandExpr::Band(band) => {
            let selectors = graph.constant(json!([band.code()]));
            graph.invoke(
                "Image.select",
                &[("input", image), ("bandSelectors", selectors)],
            )
        }
        BandExpr::Const(value) => {
            let constant = graph.constant(json!(value));
            graph.invoke("Image.constant", &[("value", constant)])
        }
        BandExpr::Add(lhs, rhs) => encode_binary(graph, "Image.add", lhs, rhs, image),
        BandExpr::Sub(lhs, rhs) => encode_binary(graph, "Image.subtract", lhs, rhs, image),
        BandExpr::Mul(lhs, rhs) => encode_binary(graph, "Image.multiply", lhs, rhs, image),
        BandExpr::Div(lhs, rhs) => encode_binary(graph, "Image.divide", lhs, rhs, image),
    }
}

fn encode_binary(
    graph: &mut ExprGraph,
    function: &str,
    lhs: &BandExpr,
    rhs: &BandExpr,
    image: NodeRef,
) -> NodeRef {
    let left = encode_band_expr(graph, lhs, image);
    let right = encode_band_expr(graph, rhs, image);
    graph.invoke(function, &[("image1", left), ("image2", right)])
}

/// Parses the computed feature collection into site samples.
///
/// Features whose properties carry none of the index values (sites
/// outside the composite's coverage) are omitted, matching the sampler
/// contract.
fn parse_feature_collection(value: &Value) -> Result<Vec<SiteSample>, ImageryError> {
    // value:compute wraps the value in {"result": ...}; accept both forms.
    let root = value.get("result").unwrap_or(value);

    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| ImageryError::Parse {
            message: "no features array in compute response".to_string(),
        })?;

    let mut samples = Vec::with_capacity(features.len());

    for feature in features {
        let properties = &feature["properties"];

        let site_id = match &properties["oreum_id"] {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        };

        let sample = SiteSample {
            site_id,
            muddy_index: properties["muddy_index"].as_f64(),
            green_visual_index: properties["green_visual_index"].as_f64(),
            fire_risk_index: properties["fire_risk_index"].as_f64(),
            erosion_index: properties["erosion_index"].as_f64(),
        };

        let has_any_value = sample.muddy_index.is_some()
            || sample.green_visual_index.is_some()
            || sample.fire_risk_index.is_some()
            || sample.erosion_index.is_some();

        if has_any_value {
            samples.push(sample);
        } else {
            log::debug!(
                "Site {:?} returned no index values, omitting",
                sample.site_id
            );
        }
    }

    Ok(samples)
}

/// A node's position in the expression graph's value table.
#[derive(Debug, Clone, Copy)]
struct NodeRef(usize);

/// Builder for the `{"result": ..., "values": {...}}` expression form the
/// REST API evaluates. Every node is stored once in the value table and
/// referenced by key, the shape the official clients serialize to.
#[derive(Debug, Default)]
struct ExprGraph {
    nodes: Vec<Value>,
}

impl ExprGraph {
    fn push(&mut self, node: Value) -> NodeRef {
        self.nodes.push(node);
        NodeRef(self.nodes.len() - 1)
    }

    fn constant(&mut self, value: Value) -> NodeRef {
        self.push(json!({ "constantValue": value }))
    }

    fn argument(&mut self, name: &str) -> NodeRef {
        self.push(json!({ "argumentReference": name }))
    }

    fn invoke(&mut self, function: &str, args: &[(&str, NodeRef)]) -> NodeRef {
        let arguments: BTreeMap<&str, Value> = args
            .iter()
            .map(|(name, node)| (*name, json!({ "valueReference": node.0.to_string() })))
            .collect();

        self.push(json!({
            "functionInvocationValue": {
                "functionName": function,
                "arguments": arguments,
            }
        }))
    }

    fn array(&mut self, items: &[NodeRef]) -> NodeRef {
        let values: Vec<Value> = items
            .iter()
            .map(|node| json!({ "valueReference": node.0.to_string() }))
            .collect();
        self.push(json!({ "arrayValue": { "values": values } }))
    }

    fn function(&mut self, argument_names: &[&str], body: NodeRef) -> NodeRef {
        self.push(json!({
            "functionDefinitionValue": {
                "argumentNames": argument_names,
                "body": body.0.to_string(),
            }
        }))
    }

    fn finish(self, result: NodeRef) -> Value {
        let values: BTreeMap<String, Value> = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(index, node)| (index.to_string(), node))
            .collect();

        json!({
            "result": result.0.to_string(),
            "values": values,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use oreum_watch_imagery_models::TemporalWindow;
    use oreum_watch_indices::SpectralIndex;
    use oreum_watch_site_models::SiteGeometry;

    use super::*;

    fn request_fixture(
        window: &TemporalWindow,
        sites: &[SiteGeometry],
    ) -> Value {
        let request = CompositeRequest {
            collection: "COPERNICUS/S2_SR_HARMONIZED",
            window,
            cloud_ceiling_pct: 20.0,
            indices: SpectralIndex::all(),
            scale: 10.0,
            sites,
        };
        build_expression(&request)
    }

    fn invoked_functions(expression: &Value) -> Vec<String> {
        expression["values"]
            .as_object()
            .unwrap()
            .values()
            .filter_map(|node| {
                node.get("functionInvocationValue")
                    .and_then(|f| f["functionName"].as_str())
                    .map(String::from)
            })
            .collect()
    }

    #[test]
    fn expression_covers_the_whole_pipeline() {
        let window =
            TemporalWindow::ending_on(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 30);
        let sites = vec![SiteGeometry::new("oreum-1", 126.5, 33.4)];
        let expression = request_fixture(&window, &sites);

        let functions = invoked_functions(&expression);
        for expected in [
            "ImageCollection.load",
            "Filter.dateRangeContains",
            "Filter.lessThan",
            "Collection.filter",
            "Collection.map",
            "reduce.median",
            "GeometryConstructors.Point",
            "Feature",
            "Reducer.mean",
            "Image.reduceRegions",
        ] {
            assert!(
                functions.iter().any(|f| f == expected),
                "missing {expected} in {functions:?}"
            );
        }

        // The result node is the reduceRegions call
        let result_key = expression["result"].as_str().unwrap();
        let result_node = &expression["values"][result_key];
        assert_eq!(
            result_node["functionInvocationValue"]["functionName"],
            "Image.reduceRegions"
        );
    }

    #[test]
    fn expression_embeds_window_ceiling_and_band_names() {
        let window =
            TemporalWindow::ending_on(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 30);
        let sites = vec![SiteGeometry::new("oreum-1", 126.5, 33.4)];
        let expression = request_fixture(&window, &sites);

        let constants: Vec<&Value> = expression["values"]
            .as_object()
            .unwrap()
            .values()
            .filter_map(|node| node.get("constantValue"))
            .collect();

        assert!(constants.iter().any(|c| **c == json!("2024-02-14")));
        assert!(constants.iter().any(|c| **c == json!("2024-03-15")));
        assert!(constants.iter().any(|c| **c == json!(20.0)));
        for index in SpectralIndex::all() {
            assert!(
                constants.iter().any(|c| **c == json!([index.band_name()])),
                "missing rename constant for {index}"
            );
        }
    }

    #[test]
    fn one_feature_is_built_per_site() {
        let window =
            TemporalWindow::ending_on(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), 30);
        let sites = vec![
            SiteGeometry::new("oreum-1", 126.5, 33.4),
            SiteGeometry::new("oreum-2", 126.9, 33.5),
        ];
        let expression = request_fixture(&window, &sites);

        let feature_count = invoked_functions(&expression)
            .iter()
            .filter(|f| *f == "Feature")
            .count();
        assert_eq!(feature_count, 2);
    }

    #[test]
    fn parses_features_and_omits_empty_ones() {
        let body = json!({
            "result": {
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "properties": {
                            "oreum_id": "oreum-1",
                            "muddy_index": -0.33,
                            "green_visual_index": 0.4,
                            "fire_risk_index": 0.77,
                            "erosion_index": -0.11,
                        }
                    },
                    {
                        "type": "Feature",
                        "properties": {
                            "oreum_id": 7,
                            "muddy_index": -0.1,
                        }
                    },
                    {
                        "type": "Feature",
                        "properties": { "oreum_id": "outside-coverage" }
                    },
                ]
            }
        });

        let samples = parse_feature_collection(&body).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].site_id.as_deref(), Some("oreum-1"));
        assert_eq!(samples[1].site_id.as_deref(), Some("7"));
        assert!(samples[1].green_visual_index.is_none());
    }

    #[test]
    fn missing_features_array_is_a_parse_error() {
        let body = json!({ "result": { "unexpected": true } });
        let err = parse_feature_collection(&body).unwrap_err();
        assert!(matches!(err, ImageryError::Parse { .. }));
    }
}
