//! Vendor resource names
//!
//! LTS stream names and AOM rule names are global within the account, so both
//! carry the cluster and the env (or namespace).

pub fn stream_name(prefix: &str, project: &str, app: &str, env: &str, cluster: &str) -> String {
    format!("{}{}-{}-{}-{}", prefix, project, app, env, cluster)
}

pub fn rule_name(project: &str, app: &str, namespace: &str, cluster: &str) -> String {
    format!("AMS-log-{}-{}-{}-{}", project, app, namespace, cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(
            stream_name("qt-", "shop", "api", "stg", "zeus"),
            "qt-shop-api-stg-zeus"
        );
        assert_eq!(stream_name("", "shop", "api", "prd", "hera"), "shop-api-prd-hera");
        assert_eq!(
            rule_name("shop", "api", "stg", "zeus"),
            "AMS-log-shop-api-stg-zeus"
        );
    }
}
