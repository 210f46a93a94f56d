#![no_main]

use libfuzzer_sys::fuzz_target;
use rampload::loadtest::config::LoadTestConfig;
use rampload::loadtest::scheduler::StageScheduler;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Any config that validates must also build a scheduler.
    if let Ok(config) = LoadTestConfig::from_toml(text) {
        let scheduler = StageScheduler::new(config.stage.clone())
            .expect("validated stages always build a scheduler");
        let total = scheduler.total_duration();
        assert_eq!(scheduler.target_concurrency(total), config.stage[config.stage.len() - 1].target);
    }
});
