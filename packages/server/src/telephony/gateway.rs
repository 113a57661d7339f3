//! Thin wrapper over `twilio::TelephonyClient` that fills in the engine's
//! own public URLs for the answer/status/recording webhooks.

use twilio::{InitiateCallRequest, InitiateCallResponse, StreamOptions, TelephonyClient, TwilioError};

use crate::config::Config;

/// `placeCall({to, message?, record?, speakFirst?, initialMessage?}) ->
/// {callSid, status}`. `speak_first`/`initial_message` ride along as query
/// params on the answer URL so the `/voice/answer` handler can recover
/// them with no other state, since the provider calls back on a fresh
/// HTTP request.
pub struct TelephonyGateway {
    client: TelephonyClient,
    public_base_url: String,
    from_number: String,
}

impl TelephonyGateway {
    pub fn new(client: TelephonyClient, config: &Config) -> Self {
        Self {
            client,
            public_base_url: config.public_base_url.clone(),
            from_number: config.twilio_from_number.clone(),
        }
    }

    pub async fn place_call(
        &self,
        to: &str,
        record: bool,
        stream_options: &StreamOptions,
    ) -> Result<InitiateCallResponse, TwilioError> {
        let query = serde_urlencoded::to_string([
            ("speakFirst", stream_options.speak_first.to_string()),
            (
                "initialMessage",
                stream_options.initial_message.clone().unwrap_or_default(),
            ),
        ])
        .unwrap_or_default();

        let request = InitiateCallRequest {
            to: to.to_string(),
            from: self.from_number.clone(),
            answer_url: format!("{}/voice/answer?{}", self.public_base_url, query),
            status_callback_url: format!("{}/webhooks/status", self.public_base_url),
            recording_callback_url: record
                .then(|| format!("{}/webhooks/recording", self.public_base_url)),
            record,
            timeout_sec: 30,
        };

        self.client.initiate_call(&request).await
    }

    /// Renders the `<Connect><Stream>` TwiML for the given call, using the
    /// `speakFirst`/`initialMessage` the answer webhook recovered from its
    /// own query string (originally set by `place_call` above).
    pub fn render_answer(&self, stream_options: &StreamOptions) -> String {
        self.client.render_answer(
            self.public_base_url
                .trim_start_matches("https://")
                .trim_start_matches("http://"),
            stream_options,
        )
    }
}
