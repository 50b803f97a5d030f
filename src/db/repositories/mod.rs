mod site_stats;
