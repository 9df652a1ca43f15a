//! Implements `StatementApi` over HTTP with `reqwest`, against the administrator's login endpoint
//! and GraphQL statement endpoint.

use crate::api::{Credential, StatementApi};
use crate::model::Cnpj;
use crate::{Config, Result};
use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

const STATEMENT_QUERY: &str = r#"
query GetDemonstrativoCaixa($cnpjFundo: String!, $data: Date!) {
    getDemonstrativoCaixa(cnpjFundo: $cnpjFundo, data: $data) {
        entradas {
            titulo
            tituloCp
            data
            historico
            tipo
            debito
            credito
            saldo
            isDetalheTotal
        }
        carteira
        nomeDoFundo
        dataInicio
        dataFim
    }
}
"#;

/// Talks to the statement API over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpStatementApi {
    client: reqwest::Client,
    auth_url: Url,
    graphql_url: Url,
}

impl HttpStatementApi {
    /// Builds a client whose every request is bounded by `timeout`.
    pub fn new(auth_url: Url, graphql_url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Unable to build the HTTP client")?;
        Ok(Self {
            client,
            auth_url,
            graphql_url,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.auth_url().clone(),
            config.graphql_url().clone(),
            config.request_timeout(),
        )
    }

    /// Exchanges the API token and login for a bearer credential.
    ///
    /// # Errors
    /// Any failure is fatal to the run: a transport error, a non-success status, or a response
    /// without a token.
    pub async fn authenticate(&self, token: &str, login: &str) -> Result<Credential> {
        let response = self
            .client
            .post(self.auth_url.clone())
            .json(&json!({ "token": token, "login": login }))
            .send()
            .await
            .context("Failed to send the authentication request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            bail!("Authentication failed with status {status}: {body}");
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse the authentication response")?;
        let credential = parse_credential(&body)?;
        debug!("Obtained a bearer credential");
        Ok(credential)
    }
}

#[async_trait::async_trait]
impl StatementApi for HttpStatementApi {
    async fn fetch_statement(
        &self,
        credential: &Credential,
        entity: &Cnpj,
        date: NaiveDate,
    ) -> Result<Value> {
        trace!("fetch_statement for {entity} on {date}");
        let response = self
            .client
            .post(self.graphql_url.clone())
            .bearer_auth(credential.secret())
            .json(&statement_request(entity, date))
            .send()
            .await
            .with_context(|| format!("Failed to request the statement of {entity} for {date}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            bail!("Statement request for {entity} failed with status {status}: {body}");
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse the statement of {entity} for {date}"))
    }
}

/// The GraphQL request body for one fund and date.
fn statement_request(entity: &Cnpj, date: NaiveDate) -> Value {
    json!({
        "query": STATEMENT_QUERY,
        "variables": {
            "data": date.format("%Y-%m-%d").to_string(),
            "cnpjFundo": entity.formatted(),
        }
    })
}

fn parse_credential(body: &Value) -> Result<Credential> {
    match body.get("token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(Credential::new(token)),
        _ => bail!("The authentication response did not contain a token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_statement_request() {
        let entity = Cnpj::from_str("12345678000190").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let body = statement_request(&entity, date);
        assert_eq!(body["variables"]["data"], "2024-01-05");
        assert_eq!(body["variables"]["cnpjFundo"], "12.345.678/0001-90");
        let query = body["query"].as_str().unwrap();
        assert!(query.contains("getDemonstrativoCaixa"));
        assert!(query.contains("nomeDoFundo"));
    }

    #[test]
    fn test_parse_credential() {
        let credential = parse_credential(&json!({ "token": "abc" })).unwrap();
        assert_eq!(credential, Credential::new("abc"));
        assert!(parse_credential(&json!({ "token": "" })).is_err());
        assert!(parse_credential(&json!({ "token": null })).is_err());
        assert!(parse_credential(&json!({ "message": "denied" })).is_err());
    }

    #[test]
    fn test_new_client() {
        let api = HttpStatementApi::new(
            Url::parse("https://a.example.com/auth").unwrap(),
            Url::parse("https://a.example.com/graphql").unwrap(),
            Duration::from_secs(20),
        )
        .unwrap();
        assert_eq!(api.graphql_url.path(), "/graphql");
    }
}
