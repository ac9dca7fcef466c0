use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use super::Agent;
use crate::client::OllamaClient;
use crate::config::ConfigSnapshot;
use crate::errors::{AgentError, AgentResult, OllamaError, OllamaResult};
use crate::models::message::Message;
use crate::models::request::ChatRequest;

pub const OPENWEATHERMAP_HOST: &str = "https://api.openweathermap.org";
pub const CITY_EXTRACTION_MODEL: &str = "qwen2.5:7b";

const WEATHER_PATTERN: &str = r"(?i)weather|temperature|天气|气温|温度|下雨|晴|阴";

const UNKNOWN_CITY_REPLY: &str = "Sorry, I couldn't identify the city you want to query. Please specify a city name, for example: 'What's the weather in Beijing?'";
const LOOKUP_FAILED_REPLY: &str =
    "Sorry, failed to get weather information. Please check if the city name is correct.";

const EXTRACTOR_SYSTEM_PROMPT: &str = "You are a city name extractor. Extract city names in Chinese or English, then convert to English names.";

/// Answers weather questions from OpenWeatherMap, using the model only to find
/// the city in the question.
pub struct WeatherAgent {
    llm: OllamaClient,
    http: Client,
    api_key: String,
    api_host: String,
    model: String,
    pattern: Regex,
}

impl WeatherAgent {
    pub fn new<S: Into<String>>(llm: OllamaClient, api_key: S) -> OllamaResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let pattern = Regex::new(WEATHER_PATTERN)
            .map_err(|e| OllamaError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            llm,
            http,
            api_key: api_key.into(),
            api_host: OPENWEATHERMAP_HOST.to_string(),
            model: CITY_EXTRACTION_MODEL.to_string(),
            pattern,
        })
    }

    /// Build the agent with the API key found in `snapshot`.
    pub fn from_snapshot(llm: OllamaClient, snapshot: &ConfigSnapshot) -> OllamaResult<Self> {
        let api_key = snapshot.weather_api_key()?;
        Self::new(llm, api_key)
    }

    /// Model used to extract the city name.
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_host<S: Into<String>>(mut self, host: S) -> Self {
        self.api_host = host.into();
        self
    }

    fn extract_city(&self, input: &str) -> AgentResult<Option<String>> {
        let prompt = format!(
            "You are a city name extractor. Follow these steps:\n\
             1. Extract the city name from the following text (can be in Chinese or English)\n\
             2. If no city name is found, return null\n\
             3. If the city name is in Chinese, convert it to its English name\n\
             4. Return only the English city name, without any explanation\n\n\
             Text: {}",
            input
        );

        // Agents stay off so the extraction cannot re-enter this agent
        let mut request = ChatRequest::new(
            self.model.clone(),
            vec![Message::system(EXTRACTOR_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_use_agents(false);

        let response = self
            .llm
            .chat(&mut request)
            .map_err(|e| AgentError::Upstream(e.to_string()))?;

        Ok(clean_city(response.content()))
    }

    fn lookup(&self, city: &str) -> AgentResult<Option<WeatherReport>> {
        let url = format!("{}/data/2.5/weather", self.api_host.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", "zh_cn"),
            ])
            .send()
            .map_err(|e| AgentError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            debug!(city, status = response.status().as_u16(), "weather lookup rejected");
            return Ok(None);
        }

        let report = response
            .json::<WeatherReport>()
            .map_err(|e| AgentError::ExecutionError(format!("Invalid weather response: {}", e)))?;
        Ok(Some(report))
    }
}

impl Agent for WeatherAgent {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Query weather information, supporting both Chinese and English city names (天气查询)"
    }

    fn can_handle(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }

    fn execute(&self, input: &str) -> AgentResult<String> {
        let Some(city) = self.extract_city(input)? else {
            return Ok(UNKNOWN_CITY_REPLY.to_string());
        };

        match self.lookup(&city)? {
            Some(report) => Ok(report.to_string()),
            None => Ok(LOOKUP_FAILED_REPLY.to_string()),
        }
    }
}

/// Normalise the model's answer to a bare city name, or `None` when it found none.
fn clean_city(answer: &str) -> Option<String> {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("null") {
        return None;
    }

    let cleaned: String = answer
        .chars()
        .filter(|c| !matches!(c, '.' | ',' | '!' | '?' | '，' | '。' | '！' | '？'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct WeatherReport {
    name: String,
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Conditions>,
    wind: Wind,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct Conditions {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

impl std::fmt::Display for WeatherReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conditions = self
            .weather
            .first()
            .map(|c| c.description.as_str())
            .unwrap_or("unknown");
        write!(
            f,
            "Weather in {}:\nTemperature: {:.1}°C\nHumidity: {}%\nConditions: {}\nWind Speed: {:.1} m/s",
            self.name, self.main.temp, self.main.humidity, conditions, self.wind.speed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const PARIS: &str = r#"{
        "coord": {"lon": 2.3488, "lat": 48.8534},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": 18.04, "feels_like": 17.2, "pressure": 1019, "humidity": 55},
        "wind": {"speed": 3.6, "deg": 250},
        "name": "Paris",
        "cod": 200
    }"#;

    fn agent_for(llm: &Server, weather: &Server) -> WeatherAgent {
        let client = OllamaClient::new(ClientConfig::new(llm.url())).unwrap();
        WeatherAgent::new(client, "test-key")
            .unwrap()
            .with_api_host(weather.url())
    }

    fn city_reply(city: &str) -> String {
        json!({
            "model": CITY_EXTRACTION_MODEL,
            "message": {"role": "assistant", "content": city},
            "done": true
        })
        .to_string()
    }

    #[test]
    fn test_agent_capabilities() {
        let llm = Server::new();
        let weather = Server::new();
        let agent = agent_for(&llm, &weather);

        assert_eq!(agent.name(), "weather");
        assert!(agent.description().contains("天气"));

        assert!(agent.can_handle("北京天气如何？"));
        assert!(agent.can_handle("今天天气怎么样？"));
        assert!(agent.can_handle("What's the weather in London?"));
        assert!(agent.can_handle("TEMPERATURE in Oslo"));
        assert!(!agent.can_handle("讲个故事"));
        assert!(!agent.can_handle("帮我写代码"));
    }

    #[test]
    fn test_clean_city() {
        assert_eq!(clean_city(" Paris. "), Some("Paris".to_string()));
        assert_eq!(clean_city("New York!"), Some("New York".to_string()));
        assert_eq!(clean_city("北京。"), Some("北京".to_string()));
        assert_eq!(clean_city("NULL"), None);
        assert_eq!(clean_city("?!"), None);
        assert_eq!(clean_city(""), None);
    }

    #[test]
    fn test_execute_reports_weather() {
        let mut llm = Server::new();
        let mut weather = Server::new();

        let extraction = llm
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({"model": CITY_EXTRACTION_MODEL, "stream": false})))
            .with_status(200)
            .with_body(city_reply("Paris."))
            .create();
        let lookup = weather
            .mock("GET", "/data/2.5/weather")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "Paris".into()),
                Matcher::UrlEncoded("appid".into(), "test-key".into()),
                Matcher::UrlEncoded("units".into(), "metric".into()),
            ]))
            .with_status(200)
            .with_body(PARIS)
            .create();

        let answer = agent_for(&llm, &weather)
            .execute("What's the weather in Paris?")
            .unwrap();

        extraction.assert();
        lookup.assert();
        assert_eq!(
            answer,
            "Weather in Paris:\nTemperature: 18.0°C\nHumidity: 55%\nConditions: clear sky\nWind Speed: 3.6 m/s"
        );
    }

    #[test]
    fn test_execute_without_city() {
        let mut llm = Server::new();
        let mut weather = Server::new();
        llm.mock("POST", "/api/chat")
            .with_status(200)
            .with_body(city_reply("null"))
            .create();
        let lookup = weather.mock("GET", Matcher::Any).expect(0).create();

        let answer = agent_for(&llm, &weather).execute("how is the weather?").unwrap();

        lookup.assert();
        assert!(answer.starts_with("Sorry, I couldn't identify the city"));
    }

    #[test]
    fn test_execute_unknown_city() {
        let mut llm = Server::new();
        let mut weather = Server::new();
        llm.mock("POST", "/api/chat")
            .with_status(200)
            .with_body(city_reply("Atlantis"))
            .create();
        weather
            .mock("GET", Matcher::Any)
            .with_status(404)
            .with_body(r#"{"cod":"404","message":"city not found"}"#)
            .create();

        let answer = agent_for(&llm, &weather).execute("weather in Atlantis").unwrap();
        assert_eq!(answer, LOOKUP_FAILED_REPLY);
    }

    #[test]
    fn test_model_failure_is_agent_error() {
        let mut llm = Server::new();
        let weather = Server::new();
        llm.mock("POST", "/api/chat")
            .with_status(500)
            .with_body("model crashed")
            .create();

        let err = agent_for(&llm, &weather).execute("weather in Rome").unwrap_err();
        assert!(matches!(err, AgentError::Upstream(_)));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_from_snapshot_requires_key() {
        let client = OllamaClient::new(ClientConfig::default()).unwrap();
        assert!(WeatherAgent::from_snapshot(client.clone(), &ConfigSnapshot::default()).is_err());

        let mut snapshot = ConfigSnapshot::default();
        snapshot
            .properties
            .insert(crate::config::WEATHER_KEY_PROPERTY.to_string(), "abc".to_string());
        assert!(WeatherAgent::from_snapshot(client, &snapshot).is_ok());
    }
}
