use futures_util::StreamExt;
use inference_providers::{
    AsrProvider, ChatMessage, LlmProvider, LlmRequest, RecognitionConfig, TtsProvider,
};
use inference_providers::mock::{MockAsrProvider, MockLlmProvider, MockTtsProvider};

fn request(messages: Vec<ChatMessage>) -> LlmRequest {
    LlmRequest {
        model: "test-model".to_string(),
        messages,
        max_tokens: 128,
        temperature: 0.7,
        top_p: 1.0,
        frequency_penalty: 0.0,
        presence_penalty: 0.0,
    }
}

#[tokio::test]
async fn asr_tts_llm_round_trip_through_mocks() {
    let asr = MockAsrProvider::new(vec![
        ("how".to_string(), false, 0.4),
        ("how are you".to_string(), true, 0.9),
    ]);
    let audio = Box::pin(futures_util::stream::iter(vec![vec![0u8; 320], vec![0u8; 320]]));
    let config = RecognitionConfig {
        language_code: "en-US".to_string(),
        sample_rate_hertz: 16000,
        interim_results: true,
    };
    let mut transcripts = asr.recognize_streaming(config, audio).await.unwrap();
    let mut finals = Vec::new();
    while let Some(item) = transcripts.next().await {
        let result = item.unwrap();
        if result.is_final {
            finals.push(result.transcript);
        }
    }
    assert_eq!(finals, vec!["how are you".to_string()]);

    let llm = MockLlmProvider::new("I am doing well, thanks for asking.");
    let messages = vec![ChatMessage { role: "user".to_string(), content: finals[0].clone() }];
    let reply = llm.generate_once(request(messages)).await.unwrap();
    assert_eq!(reply.text, "I am doing well, thanks for asking.");
    assert_eq!(reply.finish_reason, "stop");

    let tts = MockTtsProvider::new(4, 512);
    let mut audio_chunks = tts
        .synthesize_streaming(&reply.text, "en-US", None, 16000)
        .await
        .unwrap();
    let mut total_bytes = 0;
    while let Some(chunk) = audio_chunks.next().await {
        total_bytes += chunk.unwrap().len();
    }
    assert_eq!(total_bytes, 4 * 512);
}

#[tokio::test]
async fn llm_streaming_reassembles_to_full_reply() {
    let llm = MockLlmProvider::new("the quick brown fox");
    let mut stream = llm
        .generate(request(vec![ChatMessage { role: "user".to_string(), content: "go".to_string() }]))
        .await
        .unwrap();

    let mut joined = String::new();
    while let Some(chunk) = stream.next().await {
        joined.push_str(&chunk.unwrap());
    }
    assert_eq!(joined, "the quick brown fox");
}

#[tokio::test]
async fn tts_full_synthesis_reports_duration_matching_audio_duration_ms() {
    let tts = MockTtsProvider::new(10, 1600);
    let result = tts.synthesize_full("hello", "en-US", None, 16000).await.unwrap();
    assert_eq!(result.audio.len(), 16000);
    assert_eq!(result.duration_ms, domain::audio_duration_ms(16000, 16000));
}
