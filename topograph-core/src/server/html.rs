//! The graph page served on `/` and `/graph`.

/// Replaced by a JavaScript string literal holding the data address.
pub const ADDRESS_PLACEHOLDER: &str = "{{ADDRESS}}";

pub const GRAPH_PAGE: &str = r##"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Topograph</title>
<style>
    body { font-family: sans-serif; margin: 0; }
    form { text-align: center; padding: 8px; }
    form input[type=text], form input[type=datetime-local] {
        width: 220px;
        border: 1px solid #333;
        border-radius: 4px;
        margin: 2px 6px;
    }
    form input[type=submit] { border: 1px solid #333; border-radius: 4px; }
    .link { stroke: #ccc; stroke-width: 1.5px; fill: none; }
    .link.accept { stroke: green; }
    .link.reject { stroke: red; }
    .link.nowrejected { stroke: orange; }
    #accept { fill: green; }
    #reject { fill: red; }
    #nowrejected { fill: orange; }
    .node circle { fill: #696969; stroke: #fff; stroke-width: 1.5px; }
    .node text { pointer-events: none; font: 9px monospace; }
</style>
</head>
<body>
<form name="filter" action="/graph">
    <label>Start <input name="starttime" type="datetime-local" step="1"></label>
    <label>End <input name="endtime" type="datetime-local" step="1"></label>
    <label>Namespace <input name="namespace" type="text"></label>
    <input type="submit" value="Filter">
</form>
<script src="//d3js.org/d3.v3.min.js"></script>
<script>
(function() {
    var address = {{ADDRESS}};
    var width = 1000, height = 1000, radius = 8;

    var svg = d3.select("body").append("svg")
        .attr("viewBox", "0 0 " + width + " " + height)
        .attr("preserveAspectRatio", "xMidYMid meet");

    svg.append("defs").selectAll("marker")
        .data(["accept", "reject", "nowrejected"])
        .enter().append("marker")
        .attr("id", String)
        .attr("viewBox", "0 -5 10 10")
        .attr("markerWidth", 6)
        .attr("markerHeight", 6)
        .attr("orient", "auto")
        .append("path")
        .attr("d", "M0,-5L10,0L0,5");

    var force = d3.layout.force()
        .gravity(0.05)
        .distance(200)
        .charge(-250)
        .size([850, 500]);

    d3.json(address, function(error, graph) {
        if (error) throw error;

        var byId = {};
        graph.nodes.forEach(function(n) { byId[n.id] = n; });

        var edges = graph.links.filter(function(l) {
            return byId[l.source] && byId[l.target];
        }).map(function(l) {
            return {
                source: byId[l.source],
                target: byId[l.target],
                action: l.action,
                namespace: l.namespace,
                time: l.time
            };
        });

        force.nodes(graph.nodes).links(edges).on("tick", tick).start();

        var link = svg.selectAll(".link")
            .data(edges)
            .enter().append("polyline")
            .attr("class", function(d) { return "link " + d.action; })
            .attr("marker-mid", function(d) { return "url(#" + d.action + ")"; });

        var node = svg.selectAll(".node")
            .data(graph.nodes)
            .enter().append("g")
            .attr("class", "node")
            .call(force.drag);

        node.append("circle").attr("r", radius);
        node.append("title").text(function(d) { return d.id; });
        node.append("text")
            .attr("dx", 10)
            .attr("dy", ".35em")
            .text(function(d) { return d.name; });

        function clamp(v, max) { return Math.max(radius, Math.min(max - radius, v)); }

        function tick() {
            node.attr("transform", function(d) {
                return "translate(" + clamp(d.x, width) + "," + clamp(d.y, height) + ")";
            });
            link.attr("points", function(d) {
                return d.source.x + "," + d.source.y + " " +
                    (d.source.x + d.target.x) / 2 + "," + (d.source.y + d.target.y) / 2 + " " +
                    d.target.x + "," + d.target.y;
            });
        }
    });
})();
</script>
</body>
</html>
"##;

/// Render the page for `address`.
pub fn render(address: &str) -> String {
    GRAPH_PAGE.replace(ADDRESS_PLACEHOLDER, &js_string(address))
}

/// Quote `value` as a JavaScript string literal that is safe inside `<script>`.
pub fn js_string(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted.replace("</", "<\\/").replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_embeds_address() {
        let page = render("/get?namespace=prod");
        assert!(page.contains("var address = \"/get?namespace=prod\";"));
        assert!(!page.contains(ADDRESS_PLACEHOLDER));
    }

    #[test]
    fn test_js_string_escapes_script_close() {
        assert_eq!(
            js_string("\"</script><script>alert(1)"),
            r#""\"<\/script><script>alert(1)""#
        );
    }
}
