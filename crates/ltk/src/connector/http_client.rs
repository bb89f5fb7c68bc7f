//! Reqwest-based backend client

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use ltk_common::{
    AccountRef, Amount, Balance, BackendUrl, DocumentReceipt, DocumentUpload, Error, FeeQuote,
    MintReceipt, Parcel, ParcelId, ParcelRegistration, PaymentVerdict, TransactionRef,
    WriteEnvelope,
};

use super::{BackendConnector, ErrorResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the registry backend.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    inner: reqwest::Client,
    backend_url: BackendUrl,
}

#[derive(Debug, Serialize)]
struct VerifyPaymentRequest<'a> {
    transaction_ref: &'a TransactionRef,
    account: &'a AccountRef,
    expected_amount: Amount,
}

#[derive(Debug, Serialize)]
struct MintRequest<'a> {
    parcel_id: &'a ParcelId,
}

#[derive(Debug, Serialize)]
struct LinkWalletRequest<'a> {
    account: &'a AccountRef,
}

#[derive(Debug, Deserialize)]
struct LinkWalletResponse {}

impl HttpBackendClient {
    /// New client for the given backend base url.
    pub fn new(backend_url: BackendUrl) -> Result<Self, Error> {
        let inner = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(map_transport_error)?;

        Ok(Self { inner, backend_url })
    }

    async fn http_get<R>(&self, url: Url) -> Result<R, Error>
    where
        R: DeserializeOwned,
    {
        let response = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    async fn http_post<P, R>(&self, url: Url, payload: &P) -> Result<R, Error>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .inner
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    async fn http_patch<P, R>(&self, url: Url, payload: &P) -> Result<R, Error>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .inner
            .patch(url)
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }
}

/// Map transport-level reqwest failures onto the closed taxonomy.
fn map_transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else if err.is_connect() {
        Error::BackendUnreachable(err.to_string())
    } else {
        Error::Http {
            status: err.status().map(|s| s.as_u16()).unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

/// Decode a backend response, mapping error bodies and statuses onto the
/// closed taxonomy.
async fn decode_response<R>(response: reqwest::Response) -> Result<R, Error>
where
    R: DeserializeOwned,
{
    let status = response.status();
    let body = response.text().await.map_err(map_transport_error)?;

    if status.is_success() {
        return serde_json::from_str(&body).map_err(Error::from);
    }

    if let Ok(err_response) = serde_json::from_str::<ErrorResponse>(&body) {
        return Err(err_response.into_error(status.as_u16()));
    }

    Err(match status.as_u16() {
        408 => Error::Timeout,
        409 => Error::BackendConflict,
        429 => Error::RateLimited,
        code => Error::Http {
            status: code,
            message: body,
        },
    })
}

#[async_trait]
impl BackendConnector for HttpBackendClient {
    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn get_parcels(&self) -> Result<Vec<Parcel>, Error> {
        let url = self.backend_url.join_paths(&["parcels"])?;
        self.http_get(url).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn get_my_parcels(&self, account: &AccountRef) -> Result<Vec<Parcel>, Error> {
        let mut url = self.backend_url.join_paths(&["parcels", "my"])?;
        url.query_pairs_mut()
            .append_pair("account", account.as_str());
        self.http_get(url).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn get_parcel(&self, id: &ParcelId) -> Result<Parcel, Error> {
        let url = self.backend_url.join_paths(&["parcels", id.as_str()])?;
        self.http_get(url).await
    }

    #[instrument(skip_all, fields(backend_url = %self.backend_url))]
    async fn post_parcel(
        &self,
        registration: ParcelRegistration,
    ) -> Result<WriteEnvelope<Parcel>, Error> {
        let url = self.backend_url.join_paths(&["parcels"])?;
        self.http_post(url, &registration).await
    }

    #[instrument(skip_all, fields(backend_url = %self.backend_url, parcel = %id, file = %document.file_name))]
    async fn post_parcel_document(
        &self,
        id: &ParcelId,
        document: DocumentUpload,
    ) -> Result<WriteEnvelope<DocumentReceipt>, Error> {
        let url = self
            .backend_url
            .join_paths(&["parcels", id.as_str(), "documents"])?;

        let part = reqwest::multipart::Part::bytes(document.bytes)
            .file_name(document.file_name)
            .mime_str(&document.content_type)
            .map_err(map_transport_error)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .inner
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode_response(response).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn post_mint(&self, id: &ParcelId) -> Result<WriteEnvelope<MintReceipt>, Error> {
        let url = self.backend_url.join_paths(&["parcels", "mint"])?;
        self.http_post(url, &MintRequest { parcel_id: id }).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn delist_parcel(&self, id: &ParcelId) -> Result<WriteEnvelope<Parcel>, Error> {
        let url = self
            .backend_url
            .join_paths(&["parcels", id.as_str(), "delist"])?;
        self.http_patch(url, &serde_json::json!({})).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn get_exchange_rate(&self) -> Result<FeeQuote, Error> {
        let url = self
            .backend_url
            .join_paths(&["payment", "exchange-rate"])?;
        self.http_get(url).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn check_balance(&self, account: &AccountRef) -> Result<Balance, Error> {
        let url = self
            .backend_url
            .join_paths(&["payment", "check-balance", account.as_str()])?;
        self.http_get(url).await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url, transaction = %transaction_ref))]
    async fn verify_payment(
        &self,
        transaction_ref: &TransactionRef,
        account: &AccountRef,
        expected_amount: Amount,
    ) -> Result<PaymentVerdict, Error> {
        let url = self
            .backend_url
            .join_paths(&["payment", "verify-payment"])?;
        self.http_post(
            url,
            &VerifyPaymentRequest {
                transaction_ref,
                account,
                expected_amount,
            },
        )
        .await
    }

    #[instrument(skip(self), fields(backend_url = %self.backend_url))]
    async fn link_wallet(&self, account: &AccountRef) -> Result<(), Error> {
        let url = self.backend_url.join_paths(&["auth", "user", "wallet"])?;
        let _: LinkWalletResponse = self.http_post(url, &LinkWalletRequest { account }).await?;
        Ok(())
    }
}
