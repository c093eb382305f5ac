/// Endpoint set and default credentials for one sandbox bank.
#[derive(Debug, Clone)]
pub struct BankConfig {
    pub code: String,
    pub name: String,
    pub base_url: String,
    pub auth_url: String,
    pub well_known_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// The fixed set of banks this deployment knows about. Built once at startup
/// from config and read-only afterwards; the local/external topology switch
/// is injected here instead of living in a mutable global.
#[derive(Debug)]
pub struct BankDirectory {
    banks: Vec<BankConfig>,
}

struct BankSeed {
    code: &'static str,
    name: &'static str,
    local_origin: &'static str,
    external_origin: &'static str,
}

const SEEDS: &[BankSeed] = &[
    BankSeed {
        code: "vbank",
        name: "Virtual Bank",
        local_origin: "http://vbank:8001",
        external_origin: "https://vbank.open.bankingapi.ru",
    },
    BankSeed {
        code: "abank",
        name: "A Bank",
        local_origin: "http://abank:8002",
        external_origin: "https://abank.open.bankingapi.ru",
    },
    BankSeed {
        code: "sbank",
        name: "S Bank",
        local_origin: "http://sbank:8003",
        external_origin: "https://sbank.open.bankingapi.ru",
    },
];

impl BankDirectory {
    pub fn new(use_local: bool, default_client_id: &str, default_client_secret: &str) -> Self {
        let banks = SEEDS
            .iter()
            .map(|seed| {
                let origin = if use_local {
                    seed.local_origin
                } else {
                    seed.external_origin
                };
                BankConfig {
                    code: seed.code.to_string(),
                    name: seed.name.to_string(),
                    base_url: origin.to_string(),
                    auth_url: format!("{origin}/auth/bank-token"),
                    well_known_url: format!("{origin}/.well-known/jwks.json"),
                    client_id: default_client_id.to_string(),
                    client_secret: default_client_secret.to_string(),
                }
            })
            .collect();
        Self { banks }
    }

    pub fn lookup(&self, bank_code: &str) -> Option<&BankConfig> {
        self.banks.iter().find(|b| b.code == bank_code)
    }

    pub fn list_all(&self) -> &[BankConfig] {
        &self.banks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_bank() {
        let dir = BankDirectory::new(false, "team227", "s3cret");
        let bank = dir.lookup("vbank").expect("vbank is configured");
        assert_eq!(bank.name, "Virtual Bank");
        assert_eq!(bank.base_url, "https://vbank.open.bankingapi.ru");
        assert_eq!(bank.auth_url, "https://vbank.open.bankingapi.ru/auth/bank-token");
        assert_eq!(bank.client_id, "team227");
    }

    #[test]
    fn lookup_unknown_bank_is_none() {
        let dir = BankDirectory::new(false, "team227", "s3cret");
        assert!(dir.lookup("zbank").is_none());
    }

    #[test]
    fn local_topology_switches_origins() {
        let dir = BankDirectory::new(true, "team227", "s3cret");
        let bank = dir.lookup("abank").expect("abank is configured");
        assert_eq!(bank.base_url, "http://abank:8002");
        assert_eq!(bank.well_known_url, "http://abank:8002/.well-known/jwks.json");
    }

    #[test]
    fn list_all_is_stable_and_complete() {
        let dir = BankDirectory::new(false, "team227", "s3cret");
        let codes: Vec<_> = dir.list_all().iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["vbank", "abank", "sbank"]);
    }
}
