//! Cluster topology discovery for KV clouds.

use serde::Serialize;

/// One master node of a cache cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub host: String,
    pub port: u16,
    pub id: String,
}

impl NodeInfo {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// Parse `CLUSTER NODES` output down to healthy masters.
///
/// Line shape: `<id> <ip:port@cport> <flags> <master> <ping> <pong> <epoch>
/// <state> <slots...>`; flags is a comma list that contains `master` for
/// masters and `fail`/`fail?` while the cluster considers the node down.
pub fn parse_cluster_nodes(raw: &str) -> Vec<NodeInfo> {
    let mut masters = Vec::new();
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let flags: Vec<&str> = fields[2].split(',').collect();
        if !flags.contains(&"master") {
            continue;
        }
        if flags.iter().any(|f| f.starts_with("fail")) {
            continue;
        }
        let addr = fields[1].split('@').next().unwrap_or("");
        let Some((host, port)) = addr.rsplit_once(':') else {
            continue;
        };
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };
        if host.is_empty() {
            continue;
        }
        masters.push(NodeInfo {
            host: host.to_string(),
            port,
            id: fields[0].to_string(),
        });
    }
    masters
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 127.0.0.1:30006@31006 master,fail - 1426238315239 1426238316000 6 disconnected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
";

    #[test]
    fn test_parses_masters_only() {
        let masters = parse_cluster_nodes(SAMPLE);
        assert_eq!(masters.len(), 3);
        assert!(masters.iter().all(|m| m.host == "127.0.0.1"));
        let ports: Vec<u16> = masters.iter().map(|m| m.port).collect();
        assert!(ports.contains(&30001));
        assert!(ports.contains(&30002));
        assert!(ports.contains(&30003));
    }

    #[test]
    fn test_failed_master_excluded() {
        let masters = parse_cluster_nodes(SAMPLE);
        assert!(masters.iter().all(|m| m.port != 30006));
    }

    #[test]
    fn test_myself_flag_still_master() {
        let masters = parse_cluster_nodes(SAMPLE);
        assert!(masters.iter().any(|m| m.port == 30001));
    }

    #[test]
    fn test_garbage_lines_skipped() {
        assert!(parse_cluster_nodes("not a topology\n\n").is_empty());
    }

    #[test]
    fn test_node_url() {
        let node = NodeInfo {
            host: "10.0.0.5".into(),
            port: 6379,
            id: "abc".into(),
        };
        assert_eq!(node.url(), "redis://10.0.0.5:6379/");
    }
}
